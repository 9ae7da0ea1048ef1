//! Read-only view over an API-format workflow graph.
//!
//! A graph is a JSON object mapping node ids to node records:
//!
//! ```json
//! { "3": { "class_type": "KSampler", "inputs": { "seed": 42, "positive": ["6", 0] } } }
//! ```
//!
//! Inputs are either literals or edge references (`[source_node_id, output_slot]`).
//! Nothing here mutates or retains the graph beyond the borrow.

use serde_json::{Map, Number, Value};

/// Closed set of node kinds the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Sampler,
    CfgGuider,
    NagCfgGuider,
    AdaptiveGuider,
    PaddingRemoval,
    TextEncode,
    FluxTextEncode,
    Other,
}

/// What part a node kind plays in a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Carries conditioning wiring and generation parameters.
    Sampler,
    /// Carries conditioning wiring only.
    Guider,
    /// Forwards a single conditioning input unchanged.
    Passthrough,
    /// Holds literal prompt text.
    TextSource,
    Ignored,
}

/// How a text-source kind exposes its prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRule {
    /// The field must hold a literal string (empty allowed).
    Required(&'static str),
    /// First non-empty string among the fields, else an empty prompt.
    FirstNonEmpty(&'static [&'static str]),
}

/// Declarative description of the fields a node kind is read through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub role: NodeRole,
    pub positive: Option<&'static str>,
    pub negative: Option<&'static str>,
    /// Guider edges that land on a passthrough node are followed one hop.
    pub unwrap_passthrough: bool,
    /// Input forwarded by a passthrough node.
    pub forwards: Option<&'static str>,
    pub text: Option<TextRule>,
    /// Unreferenced text nodes may be classified by `_meta.title`.
    pub title_fallback: bool,
}

/// Sampler inputs holding generation parameters.
pub const SEED_INPUT: &str = "seed";
pub const STEPS_INPUT: &str = "steps";
pub const CFG_INPUT: &str = "cfg";

const NONE: Capabilities = Capabilities {
    role: NodeRole::Ignored,
    positive: None,
    negative: None,
    unwrap_passthrough: false,
    forwards: None,
    text: None,
    title_fallback: false,
};

impl NodeKind {
    pub fn from_class_type(class_type: &str) -> Self {
        match class_type {
            "KSampler" | "KSamplerAdvanced" => Self::Sampler,
            "CFGGuider" => Self::CfgGuider,
            "NAGCFGGuider" => Self::NagCfgGuider,
            "AdaptiveGuidance" => Self::AdaptiveGuider,
            "ChromaPaddingRemoval" => Self::PaddingRemoval,
            "CLIPTextEncode" => Self::TextEncode,
            "CLIPTextEncodeFlux" => Self::FluxTextEncode,
            _ => Self::Other,
        }
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::Sampler => Capabilities {
                role: NodeRole::Sampler,
                positive: Some("positive"),
                negative: Some("negative"),
                ..NONE
            },
            Self::CfgGuider => Capabilities {
                role: NodeRole::Guider,
                positive: Some("positive"),
                negative: Some("negative"),
                unwrap_passthrough: true,
                ..NONE
            },
            Self::NagCfgGuider => Capabilities {
                role: NodeRole::Guider,
                positive: Some("positive"),
                negative: Some("nag_negative"),
                ..NONE
            },
            Self::AdaptiveGuider => Capabilities {
                role: NodeRole::Guider,
                positive: Some("positive"),
                negative: Some("negative"),
                ..NONE
            },
            Self::PaddingRemoval => Capabilities {
                role: NodeRole::Passthrough,
                forwards: Some("conditioning"),
                ..NONE
            },
            Self::TextEncode => Capabilities {
                role: NodeRole::TextSource,
                text: Some(TextRule::Required("text")),
                title_fallback: true,
                ..NONE
            },
            Self::FluxTextEncode => Capabilities {
                role: NodeRole::TextSource,
                text: Some(TextRule::FirstNonEmpty(&["clip_l", "t5xxl"])),
                ..NONE
            },
            Self::Other => NONE,
        }
    }
}

/// Borrowed view of a parsed workflow graph.
///
/// A value that is not a JSON object behaves as an empty graph.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowGraph<'a> {
    nodes: Option<&'a Map<String, Value>>,
}

impl<'a> WorkflowGraph<'a> {
    pub fn new(workflow: &'a Value) -> Self {
        Self {
            nodes: workflow.as_object(),
        }
    }

    /// Nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeView<'a>> + 'a {
        self.nodes
            .into_iter()
            .flat_map(|nodes| nodes.iter())
            .map(|(id, raw)| NodeView {
                id: id.as_str(),
                raw,
            })
    }

    /// Looks up a node by id. Dangling ids yield `None`.
    pub fn node(&self, id: &str) -> Option<NodeView<'a>> {
        let (id, raw) = self.nodes?.get_key_value(id)?;
        Some(NodeView {
            id: id.as_str(),
            raw,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.map(Map::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    id: &'a str,
    raw: &'a Value,
}

impl<'a> NodeView<'a> {
    pub fn id(&self) -> &'a str {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.raw
            .get("class_type")
            .and_then(Value::as_str)
            .map(NodeKind::from_class_type)
            .unwrap_or(NodeKind::Other)
    }

    /// The node's inputs, or `None` when missing, malformed or empty.
    pub fn inputs(&self) -> Option<&'a Map<String, Value>> {
        self.raw
            .get("inputs")
            .and_then(Value::as_object)
            .filter(|inputs| !inputs.is_empty())
    }

    pub fn input(&self, name: &str) -> Option<&'a Value> {
        self.inputs()?.get(name)
    }

    /// Source node id of a wired input.
    pub fn edge(&self, name: &str) -> Option<String> {
        self.input(name).and_then(edge_source)
    }

    /// Literal numeric input. Edge references and strings are rejected.
    pub fn number(&self, name: &str) -> Option<&'a Number> {
        match self.input(name)? {
            Value::Number(number) => Some(number),
            _ => None,
        }
    }

    /// Literal string input.
    pub fn text(&self, name: &str) -> Option<&'a str> {
        self.input(name).and_then(Value::as_str)
    }

    /// Lowercased `_meta.title`, empty when absent.
    pub fn title(&self) -> String {
        self.raw
            .get("_meta")
            .and_then(|meta| meta.get("title"))
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .unwrap_or_default()
    }
}

/// Parses an edge reference (`["6", 0]` or `[6, 0]`) into its source node id.
pub fn edge_source(value: &Value) -> Option<String> {
    let first = value.as_array()?.first()?;
    match first {
        Value::String(id) => (!id.is_empty()).then(|| id.clone()),
        Value::Number(number) if number.is_i64() || number.is_u64() => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edge_source_accepts_string_and_integer_ids() {
        assert_eq!(edge_source(&json!(["6", 0])).as_deref(), Some("6"));
        assert_eq!(edge_source(&json!([12, 1])).as_deref(), Some("12"));
        assert_eq!(edge_source(&json!(["7"])).as_deref(), Some("7"));
        assert_eq!(edge_source(&json!([" 6 ", 0])).as_deref(), Some(" 6 "));
    }

    #[test]
    fn test_edge_source_rejects_literals_and_empty_sequences() {
        assert!(edge_source(&json!([])).is_none());
        assert!(edge_source(&json!("6")).is_none());
        assert!(edge_source(&json!(7.5)).is_none());
        assert!(edge_source(&json!([1.5, 0])).is_none());
        assert!(edge_source(&json!(["", 0])).is_none());
    }

    #[test]
    fn test_graph_preserves_document_order() {
        let workflow: Value =
            serde_json::from_str(r#"{"9": {}, "10": {}, "2": {}}"#).expect("valid json");
        let graph = WorkflowGraph::new(&workflow);
        let ids: Vec<&str> = graph.nodes().map(|node| node.id()).collect();
        assert_eq!(ids, vec!["9", "10", "2"]);
    }

    #[test]
    fn test_non_object_graph_is_empty() {
        let workflow = json!(["not", "a", "graph"]);
        let graph = WorkflowGraph::new(&workflow);
        assert!(graph.is_empty());
        assert_eq!(graph.nodes().count(), 0);
        assert!(graph.node("0").is_none());
    }

    #[test]
    fn test_node_view_reads_typed_inputs() {
        let workflow = json!({
            "3": {
                "class_type": "KSampler",
                "_meta": {"title": "Main KSampler"},
                "inputs": {"seed": 5, "cfg": ["8", 0], "sampler_name": "euler"}
            }
        });
        let graph = WorkflowGraph::new(&workflow);
        let node = graph.node("3").expect("node exists");

        assert_eq!(node.kind(), NodeKind::Sampler);
        assert_eq!(node.number("seed").and_then(Number::as_i64), Some(5));
        assert!(node.number("cfg").is_none());
        assert_eq!(node.edge("cfg").as_deref(), Some("8"));
        assert!(node.number("sampler_name").is_none());
        assert_eq!(node.title(), "main ksampler");
    }

    #[test]
    fn test_empty_inputs_are_treated_as_missing() {
        let workflow = json!({"1": {"class_type": "CLIPTextEncode", "inputs": {}}});
        let graph = WorkflowGraph::new(&workflow);
        let node = graph.node("1").expect("node exists");
        assert!(node.inputs().is_none());
        assert!(node.text("text").is_none());
    }

    #[test]
    fn test_capabilities_describe_asymmetric_negative_field() {
        let caps = NodeKind::from_class_type("NAGCFGGuider").capabilities();
        assert_eq!(caps.role, NodeRole::Guider);
        assert_eq!(caps.negative, Some("nag_negative"));
        assert!(!caps.unwrap_passthrough);

        let caps = NodeKind::from_class_type("CFGGuider").capabilities();
        assert!(caps.unwrap_passthrough);

        assert_eq!(
            NodeKind::from_class_type("SaveImage").capabilities().role,
            NodeRole::Ignored
        );
    }
}
