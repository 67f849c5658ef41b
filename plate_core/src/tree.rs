//! Arena-backed document tree.
//!
//! Every container (mapping or sequence) lives in the [`Document`] arena and
//! is addressed by a [`ContainerId`]. Nodes refer to their children through
//! these handles, which gives the traversal a stable identity to track when
//! guarding against cyclic structures.

use indexmap::IndexMap;
use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeMap;
use serde::ser::SerializeSeq;
use serde_json::Number;
use serde_json::Value;
use serde_yaml_ng::value::Tag;
use serde_yaml_ng::value::TaggedValue;

use crate::PlateError;
use crate::PlateResult;

/// Handle to a container stored in a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(usize);

/// A single value in the document tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Node {
	#[default]
	Null,
	Bool(bool),
	Number(Number),
	/// A YAML float JSON has no number for: `.inf`, `-.inf` or `.nan`.
	Float(f64),
	String(String),
	Container(ContainerId),
	/// A YAML tagged value such as `!Ref bucket`.
	Tagged(Tag, Box<Node>),
}

impl Node {
	/// Returns the container handle when this node is a mapping or sequence,
	/// tagged or not.
	pub fn as_container(&self) -> Option<ContainerId> {
		match self {
			Self::Container(id) => Some(*id),
			Self::Tagged(_, inner) => inner.as_container(),
			_ => None,
		}
	}

	/// Separate the YAML tag, if any, from the value it applies to.
	pub fn split_tag(self) -> (Option<Tag>, Self) {
		match self {
			Self::Tagged(tag, inner) => (Some(tag), *inner),
			other => (None, other),
		}
	}

	/// Wrap the node in `tag` when one is given.
	#[must_use]
	pub fn with_tag(self, tag: Option<Tag>) -> Self {
		match tag {
			Some(tag) => Self::Tagged(tag, Box::new(self)),
			None => self,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(value) => Some(value),
			_ => None,
		}
	}
}

/// An insertion-ordered string-keyed mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
	entries: IndexMap<String, Node>,
}

impl Mapping {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn get(&self, key: &str) -> Option<&Node> {
		self.entries.get(key)
	}

	/// Insert a value. An existing key keeps its position and has its value
	/// replaced; a new key is appended.
	pub fn insert(&mut self, key: String, value: Node) -> Option<Node> {
		self.entries.insert(key, value)
	}

	/// Remove a key while preserving the order of the remaining entries.
	pub fn remove(&mut self, key: &str) -> Option<Node> {
		self.entries.shift_remove(key)
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.entries.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v))
	}
}

impl FromIterator<(String, Node)> for Mapping {
	fn from_iter<T: IntoIterator<Item = (String, Node)>>(iter: T) -> Self {
		Self {
			entries: iter.into_iter().collect(),
		}
	}
}

/// A container node stored in the arena.
#[derive(Debug, Clone, PartialEq)]
pub enum Container {
	Sequence(Vec<Node>),
	Mapping(Mapping),
}

/// A parsed document: an arena of containers plus the root node.
#[derive(Debug, Clone, Default)]
pub struct Document {
	containers: Vec<Container>,
	root: Node,
}

impl Document {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn root(&self) -> &Node {
		&self.root
	}

	pub fn set_root(&mut self, root: Node) {
		self.root = root;
	}

	/// Returns true when the document holds no value at all (an empty YAML
	/// document or an explicit `null`).
	pub fn is_null(&self) -> bool {
		self.root == Node::Null
	}

	/// Store a container in the arena and return its handle.
	pub fn insert_container(&mut self, container: Container) -> ContainerId {
		self.containers.push(container);
		ContainerId(self.containers.len() - 1)
	}

	pub fn container(&self, id: ContainerId) -> &Container {
		&self.containers[id.0]
	}

	pub fn container_mut(&mut self, id: ContainerId) -> &mut Container {
		&mut self.containers[id.0]
	}

	/// Build a document from a JSON value.
	pub fn from_json(value: Value) -> Self {
		let mut document = Self::new();
		let root = document.allocate(value);
		document.root = root;
		document
	}

	/// Build a document from a YAML value. Merge keys (`<<`) are applied,
	/// tags are kept on their values (tags on keys are dropped) and
	/// non-string keys are stringified.
	pub fn from_yaml(mut value: serde_yaml_ng::Value, path: &str) -> PlateResult<Self> {
		value.apply_merge().map_err(|e| {
			PlateError::Parse {
				path: path.to_string(),
				format: "yaml".to_string(),
				message: e.to_string(),
				line: 0,
				column: 0,
			}
		})?;

		let mut document = Self::new();
		let root = document.allocate_yaml(value, path)?;
		document.root = root;
		Ok(document)
	}

	/// Move a JSON value into the arena, returning the node that refers to it.
	pub fn allocate(&mut self, value: Value) -> Node {
		match value {
			Value::Null => Node::Null,
			Value::Bool(b) => Node::Bool(b),
			Value::Number(n) => Node::Number(n),
			Value::String(s) => Node::String(s),
			Value::Array(items) => {
				let nodes = items.into_iter().map(|item| self.allocate(item)).collect();
				Node::Container(self.insert_container(Container::Sequence(nodes)))
			}
			Value::Object(map) => {
				let mapping = map
					.into_iter()
					.map(|(key, item)| (key, self.allocate(item)))
					.collect();
				Node::Container(self.insert_container(Container::Mapping(mapping)))
			}
		}
	}

	fn allocate_yaml(&mut self, value: serde_yaml_ng::Value, path: &str) -> PlateResult<Node> {
		use serde_yaml_ng::Value as Yaml;

		let node = match value {
			Yaml::Null => Node::Null,
			Yaml::Bool(b) => Node::Bool(b),
			Yaml::Number(n) => yaml_number(&n),
			Yaml::String(s) => Node::String(s),
			Yaml::Sequence(items) => {
				let mut nodes = Vec::with_capacity(items.len());
				for item in items {
					nodes.push(self.allocate_yaml(item, path)?);
				}
				Node::Container(self.insert_container(Container::Sequence(nodes)))
			}
			Yaml::Mapping(map) => {
				let mut mapping = Mapping::new();
				for (key, item) in map {
					let key = yaml_key(key, path)?;
					let node = self.allocate_yaml(item, path)?;
					mapping.insert(key, node);
				}
				Node::Container(self.insert_container(Container::Mapping(mapping)))
			}
			Yaml::Tagged(tagged) => {
				let TaggedValue { tag, value } = *tagged;
				Node::Tagged(tag, Box::new(self.allocate_yaml(value, path)?))
			}
		};

		Ok(node)
	}

	/// Convert the document back into a JSON value.
	///
	/// Tags are dropped and non-finite floats become `null`. Cyclic documents
	/// cannot be converted; run the traversal first to reject them.
	pub fn to_json(&self) -> Value {
		self.node_to_json(&self.root)
	}

	fn node_to_json(&self, node: &Node) -> Value {
		match node {
			Node::Null => Value::Null,
			Node::Bool(b) => Value::Bool(*b),
			Node::Number(n) => Value::Number(n.clone()),
			Node::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
			Node::String(s) => Value::String(s.clone()),
			Node::Tagged(_, inner) => self.node_to_json(inner),
			Node::Container(id) => {
				match self.container(*id) {
					Container::Sequence(items) => {
						Value::Array(items.iter().map(|item| self.node_to_json(item)).collect())
					}
					Container::Mapping(mapping) => {
						Value::Object(
							mapping
								.iter()
								.map(|(key, item)| (key.to_string(), self.node_to_json(item)))
								.collect(),
						)
					}
				}
			}
		}
	}

	/// A serializable view of the whole document.
	pub fn view(&self) -> NodeView<'_> {
		NodeView {
			document: self,
			node: &self.root,
		}
	}
}

/// Borrowed view of a node that serializes its full subtree.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
	document: &'a Document,
	node: &'a Node,
}

impl Serialize for NodeView<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self.node {
			Node::Null => serializer.serialize_unit(),
			Node::Bool(b) => serializer.serialize_bool(*b),
			Node::Number(n) => n.serialize(serializer),
			Node::Float(f) => serializer.serialize_f64(*f),
			Node::String(s) => serializer.serialize_str(s),
			// serde_yaml_ng emits a single-entry map keyed by `!tag` as a tag.
			Node::Tagged(tag, inner) => {
				let mut map = serializer.serialize_map(Some(1))?;
				map.serialize_entry(&tag.to_string(), &NodeView {
					document: self.document,
					node: inner,
				})?;
				map.end()
			}
			Node::Container(id) => {
				match self.document.container(*id) {
					Container::Sequence(items) => {
						let mut seq = serializer.serialize_seq(Some(items.len()))?;
						for item in items {
							seq.serialize_element(&NodeView {
								document: self.document,
								node: item,
							})?;
						}
						seq.end()
					}
					Container::Mapping(mapping) => {
						let mut map = serializer.serialize_map(Some(mapping.len()))?;
						for (key, item) in mapping.iter() {
							map.serialize_entry(key, &NodeView {
								document: self.document,
								node: item,
							})?;
						}
						map.end()
					}
				}
			}
		}
	}
}

fn yaml_number(number: &serde_yaml_ng::Number) -> Node {
	if let Some(i) = number.as_i64() {
		return Node::Number(Number::from(i));
	}

	if let Some(u) = number.as_u64() {
		return Node::Number(Number::from(u));
	}

	let float = number.as_f64().unwrap_or(f64::NAN);
	Number::from_f64(float).map_or(Node::Float(float), Node::Number)
}

fn yaml_key(key: serde_yaml_ng::Value, path: &str) -> PlateResult<String> {
	use serde_yaml_ng::Value as Yaml;

	match key {
		Yaml::String(s) => Ok(s),
		Yaml::Number(n) => Ok(n.to_string()),
		Yaml::Bool(b) => Ok(b.to_string()),
		Yaml::Null => Ok("null".to_string()),
		Yaml::Tagged(tagged) => yaml_key(tagged.value, path),
		Yaml::Sequence(_) | Yaml::Mapping(_) => {
			Err(PlateError::Parse {
				path: path.to_string(),
				format: "yaml".to_string(),
				message: "complex mapping keys are not supported".to_string(),
				line: 0,
				column: 0,
			})
		}
	}
}
