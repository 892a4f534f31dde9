use serde::{Deserialize, Serialize};

/// Special role tags carried by a node definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialMark {
  /// The unique entry node of the workflow.
  #[serde(rename = "startNode")]
  StartNode,
  /// Any tag the engine does not interpret.
  #[serde(untagged)]
  Other(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
  /// Node id. May be omitted in the keyed encoding, where the map key is used.
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub prev_nodes: Vec<String>,
  #[serde(default)]
  pub next_nodes: Vec<String>,
  /// Display hint copied from the workflow template. Live status is tracked
  /// per task by the status service, never here.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(default)]
  pub can_undo: bool,
  #[serde(default)]
  pub can_delete: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub special_mark: Option<SpecialMark>,
  #[serde(default = "default_visible")]
  pub visible: bool,
}

fn default_visible() -> bool {
  true
}

impl NodeDef {
  /// Create a bare node definition with the given id and name.
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      prev_nodes: Vec::new(),
      next_nodes: Vec::new(),
      status: None,
      can_undo: false,
      can_delete: false,
      special_mark: None,
      visible: true,
    }
  }

  /// Whether this node is tagged as the workflow entry.
  pub fn is_start_mark(&self) -> bool {
    matches!(self.special_mark, Some(SpecialMark::StartNode))
  }
}
