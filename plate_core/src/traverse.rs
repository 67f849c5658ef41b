use std::collections::HashSet;
use std::collections::VecDeque;

use serde_json::Value;
use serde_yaml_ng::value::Tag;

use crate::Container;
use crate::ContainerId;
use crate::Document;
use crate::Node;
use crate::PlateError;
use crate::PlateResult;

/// What to do with a string leaf after it has been visited.
#[derive(Debug, Clone, PartialEq)]
pub enum TraverseAction {
	/// Replace the leaf with a new value.
	Set(Value),
	/// Splice a collection in place of the leaf. A mapping is merged into the
	/// parent mapping, a sequence is spliced into the parent sequence.
	Spread(Value),
	/// Delete the key or element holding the leaf.
	Remove,
	/// The leaf is not a placeholder, leave it untouched.
	Ignore,
}

impl TraverseAction {
	/// Build a spread action. Anything other than a mapping or a sequence
	/// degrades to [`TraverseAction::Remove`].
	pub fn spread(values: Value) -> Self {
		match values {
			Value::Array(_) | Value::Object(_) => Self::Spread(values),
			_ => Self::Remove,
		}
	}
}

/// Containers already seen in the current traversal plus the level-order
/// work-list of containers still to visit.
#[derive(Debug, Default)]
struct WorkList {
	visited: HashSet<ContainerId>,
	queue: VecDeque<(String, ContainerId)>,
}

impl WorkList {
	fn enqueue(&mut self, id: ContainerId, path: String) -> PlateResult<()> {
		if !self.visited.insert(id) {
			return Err(PlateError::CyclicStructure { path });
		}

		self.queue.push_back((path, id));
		Ok(())
	}
}

/// Walk every container of `document` in level order and apply the action
/// returned by `visit` to each string leaf.
///
/// `visit` receives the leaf value and its structural path (for example
/// `.attrs[2].name`). Numbers, booleans and nulls are never offered to it,
/// and values produced by an action are not visited again. A container
/// reachable twice fails with [`PlateError::CyclicStructure`]. A tagged
/// string is offered without its tag, and a value set in its place keeps it.
pub fn traverse_and_mutate<F>(document: &mut Document, mut visit: F) -> PlateResult<()>
where
	F: FnMut(&str, &str) -> PlateResult<TraverseAction>,
{
	let Some(root) = document.root().as_container() else {
		return Ok(());
	};

	let mut work = WorkList::default();
	work.enqueue(root, String::new())?;

	while let Some((path, id)) = work.queue.pop_front() {
		if matches!(document.container(id), Container::Sequence(_)) {
			visit_sequence(document, id, &path, &mut work, &mut visit)?;
		} else {
			visit_mapping(document, id, &path, &mut work, &mut visit)?;
		}
	}

	Ok(())
}

fn visit_sequence<F>(
	document: &mut Document,
	id: ContainerId,
	path: &str,
	work: &mut WorkList,
	visit: &mut F,
) -> PlateResult<()>
where
	F: FnMut(&str, &str) -> PlateResult<TraverseAction>,
{
	let mut index = 0;

	loop {
		let node = match document.container(id) {
			Container::Sequence(items) => items.get(index).cloned(),
			Container::Mapping(_) => None,
		};
		let Some(node) = node else {
			break;
		};

		let value_path = format!("{path}[{index}]");
		let (tag, node) = node.split_tag();
		match node {
			Node::Container(child) => {
				work.enqueue(child, value_path)?;
				index += 1;
			}
			Node::String(value) => {
				let action = visit(&value, &value_path)?;
				index = apply_in_sequence(document, id, index, action, tag);
			}
			Node::Null | Node::Bool(_) | Node::Number(_) | Node::Float(_) | Node::Tagged(..) => {
				index += 1;
			}
		}
	}

	Ok(())
}

/// Apply `action` to the element at `index` and return the index of the
/// next original element. A replaced value keeps the leaf's `tag`.
fn apply_in_sequence(
	document: &mut Document,
	id: ContainerId,
	index: usize,
	action: TraverseAction,
	tag: Option<Tag>,
) -> usize {
	match action {
		TraverseAction::Set(value) => {
			let node = document.allocate(value).with_tag(tag);
			if let Container::Sequence(items) = document.container_mut(id) {
				items[index] = node;
			}
			index + 1
		}
		TraverseAction::Spread(Value::Array(values)) => {
			let nodes: Vec<Node> = values.into_iter().map(|v| document.allocate(v)).collect();
			let count = nodes.len();
			if let Container::Sequence(items) = document.container_mut(id) {
				items.splice(index..=index, nodes);
			}
			index + count
		}
		TraverseAction::Spread(_) | TraverseAction::Remove => {
			if let Container::Sequence(items) = document.container_mut(id) {
				items.remove(index);
			}
			index
		}
		TraverseAction::Ignore => index + 1,
	}
}

fn visit_mapping<F>(
	document: &mut Document,
	id: ContainerId,
	path: &str,
	work: &mut WorkList,
	visit: &mut F,
) -> PlateResult<()>
where
	F: FnMut(&str, &str) -> PlateResult<TraverseAction>,
{
	let keys: Vec<String> = match document.container(id) {
		Container::Mapping(mapping) => mapping.keys().map(str::to_string).collect(),
		Container::Sequence(_) => return Ok(()),
	};
	// Keys written by a spread keep the spread value.
	let mut settled: HashSet<String> = HashSet::new();

	for key in keys {
		if settled.contains(&key) {
			continue;
		}

		let node = match document.container(id) {
			Container::Mapping(mapping) => mapping.get(&key).cloned(),
			Container::Sequence(_) => None,
		};
		let Some(node) = node else {
			continue;
		};

		let value_path = format!("{path}.{key}");
		let (tag, node) = node.split_tag();
		match node {
			Node::Container(child) => work.enqueue(child, value_path)?,
			Node::String(value) => {
				let action = visit(&value, &value_path)?;
				apply_in_mapping(document, id, &key, action, tag, &mut settled);
			}
			Node::Null | Node::Bool(_) | Node::Number(_) | Node::Float(_) | Node::Tagged(..) => {}
		}
	}

	Ok(())
}

fn apply_in_mapping(
	document: &mut Document,
	id: ContainerId,
	key: &str,
	action: TraverseAction,
	tag: Option<Tag>,
	settled: &mut HashSet<String>,
) {
	match action {
		TraverseAction::Set(value) => {
			let node = document.allocate(value).with_tag(tag);
			if let Container::Mapping(mapping) = document.container_mut(id) {
				mapping.insert(key.to_string(), node);
			}
		}
		TraverseAction::Spread(Value::Object(values)) => {
			let entries: Vec<(String, Node)> = values
				.into_iter()
				.map(|(k, v)| (k, document.allocate(v)))
				.collect();
			if let Container::Mapping(mapping) = document.container_mut(id) {
				mapping.remove(key);
				for (k, node) in entries {
					settled.insert(k.clone());
					mapping.insert(k, node);
				}
			}
		}
		TraverseAction::Spread(_) | TraverseAction::Remove => {
			if let Container::Mapping(mapping) = document.container_mut(id) {
				mapping.remove(key);
			}
		}
		TraverseAction::Ignore => {}
	}
}
