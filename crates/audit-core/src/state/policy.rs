//! Allowed status transitions.

use audit_types::{OrderStatus, StatusError};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Decides which status changes are accepted.
#[derive(Debug, Clone, Default)]
pub enum TransitionPolicy {
	/// Any change to a different status is accepted.
	#[default]
	Permissive,
	/// Only listed edges are accepted. A status without outgoing edges is terminal.
	Graph(HashMap<OrderStatus, HashSet<OrderStatus>>),
}

impl TransitionPolicy {
	/// Builds a policy from the `[transitions]` configuration table.
	///
	/// No table means [`TransitionPolicy::Permissive`].
	pub fn from_config(
		transitions: Option<&BTreeMap<String, Vec<String>>>,
	) -> Result<Self, StatusError> {
		let Some(transitions) = transitions else {
			return Ok(Self::Permissive);
		};

		let mut graph = HashMap::with_capacity(transitions.len());
		for (from, targets) in transitions {
			let targets = targets
				.iter()
				.map(|to| OrderStatus::new(to.as_str()))
				.collect::<Result<HashSet<_>, _>>()?;
			graph.insert(OrderStatus::new(from.as_str())?, targets);
		}
		Ok(Self::Graph(graph))
	}

	/// Returns true if `from` may change into `to`.
	pub fn allows(&self, from: &OrderStatus, to: &OrderStatus) -> bool {
		match self {
			Self::Permissive => true,
			Self::Graph(graph) => graph
				.get(from)
				.is_some_and(|targets| targets.contains(to)),
		}
	}
}
