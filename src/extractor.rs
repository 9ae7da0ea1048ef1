//! Recovers prompts and sampler parameters from a workflow graph.
//!
//! Extraction runs three scans over the graph:
//!
//! 1. Sampler scan: conditioning wiring plus seed/steps/cfg literals.
//! 2. Guider scans: only when nothing earlier found any wiring. Adaptive
//!    guidance is tried before the CFG and NAG guiders.
//! 3. Text scan: matches text-encode nodes to the wired ids, falling back to
//!    `_meta.title` for nodes nothing points at.
//!
//! The whole pass is best effort. Malformed nodes are skipped and missing
//! values stay at their "not found" defaults.

use crate::workflow::{
    Capabilities, NodeKind, NodeRole, NodeView, TextRule, WorkflowGraph, CFG_INPUT, SEED_INPUT,
    STEPS_INPUT,
};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Generation metadata recovered from a workflow graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataResult {
    pub positive: String,
    pub negative: String,
    /// Wide enough for the full unsigned 64-bit seed range as well as negatives.
    pub seed: Option<i128>,
    pub steps: Option<i128>,
    pub cfg: Option<f64>,
}

/// First-wins slot: the first offered value sticks, later offers are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOnce<T>(Option<T>);

impl<T> Default for SetOnce<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> SetOnce<T> {
    /// Stores `value` if the slot is empty. Returns whether it was stored.
    pub fn offer(&mut self, value: Option<T>) -> bool {
        if self.0.is_some() {
            return false;
        }
        match value {
            Some(value) => {
                self.0 = Some(value);
                true
            }
            None => false,
        }
    }

    /// Like [`SetOnce::offer`], but only computes the candidate when the slot is empty.
    pub fn offer_with(&mut self, value: impl FnOnce() -> Option<T>) -> bool {
        if self.0.is_some() {
            return false;
        }
        self.offer(value())
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl SetOnce<String> {
    pub fn matches(&self, id: &str) -> bool {
        self.0.as_deref() == Some(id)
    }
}

/// Node ids the positive and negative conditioning were traced back to.
#[derive(Debug, Default)]
struct ConditioningIds {
    positive: SetOnce<String>,
    negative: SetOnce<String>,
}

impl ConditioningIds {
    fn is_empty(&self) -> bool {
        !self.positive.is_set() && !self.negative.is_set()
    }
}

#[derive(Debug, Default)]
struct SamplerParams {
    seed: SetOnce<i128>,
    steps: SetOnce<i128>,
    cfg: SetOnce<f64>,
}

/// Extracts prompts, seed, steps and cfg from an API-format workflow graph.
///
/// Never fails: a graph without recognisable nodes (or one that is not a JSON
/// object at all) yields `MetadataResult::default()`.
pub fn extract_from_workflow(workflow: &Value) -> MetadataResult {
    let graph = WorkflowGraph::new(workflow);
    let mut ids = ConditioningIds::default();
    let mut params = SamplerParams::default();

    scan_samplers(&graph, &mut ids, &mut params);

    // Strictly "both unset": a sampler that wires only one side skips guiders.
    for kinds in GUIDER_PASSES {
        if !ids.is_empty() {
            break;
        }
        scan_guiders(&graph, kinds, &mut ids);
    }

    let (positive, negative) = resolve_texts(&graph, &ids);

    log::debug!(
        "Extracted workflow metadata from {} nodes (positive id: {:?}, negative id: {:?})",
        graph.len(),
        ids.positive.get(),
        ids.negative.get()
    );

    MetadataResult {
        positive,
        negative,
        seed: params.seed.into_inner(),
        steps: params.steps.into_inner(),
        cfg: params.cfg.into_inner(),
    }
}

fn scan_samplers(graph: &WorkflowGraph<'_>, ids: &mut ConditioningIds, params: &mut SamplerParams) {
    for node in graph.nodes() {
        let caps = node.kind().capabilities();
        if caps.role != NodeRole::Sampler || node.inputs().is_none() {
            continue;
        }

        offer_direct_edges(&node, &caps, ids);

        params
            .seed
            .offer_with(|| node.number(SEED_INPUT).and_then(number_to_int));
        params
            .steps
            .offer_with(|| node.number(STEPS_INPUT).and_then(number_to_int));
        params
            .cfg
            .offer_with(|| node.number(CFG_INPUT).and_then(Number::as_f64));
    }
}

/// Guider kinds in priority order. A later pass only runs while no earlier one
/// resolved either side.
const GUIDER_PASSES: [&[NodeKind]; 2] = [
    &[NodeKind::AdaptiveGuider],
    &[NodeKind::CfgGuider, NodeKind::NagCfgGuider],
];

fn scan_guiders(graph: &WorkflowGraph<'_>, kinds: &[NodeKind], ids: &mut ConditioningIds) {
    for node in graph.nodes() {
        let kind = node.kind();
        let caps = kind.capabilities();
        if caps.role != NodeRole::Guider || !kinds.contains(&kind) || node.inputs().is_none() {
            continue;
        }

        if caps.unwrap_passthrough {
            if let Some(field) = caps.positive {
                ids.positive
                    .offer_with(|| node.edge(field).map(|id| unwrap_passthrough(graph, id)));
            }
            if let Some(field) = caps.negative {
                ids.negative
                    .offer_with(|| node.edge(field).map(|id| unwrap_passthrough(graph, id)));
            }
        } else {
            offer_direct_edges(&node, &caps, ids);
        }
    }
}

fn offer_direct_edges(node: &NodeView<'_>, caps: &Capabilities, ids: &mut ConditioningIds) {
    if let Some(field) = caps.positive {
        ids.positive.offer_with(|| node.edge(field));
    }
    if let Some(field) = caps.negative {
        ids.negative.offer_with(|| node.edge(field));
    }
}

/// Follows a passthrough node one hop back to its conditioning source.
///
/// Anything else, including a dangling id, resolves to the id itself.
fn unwrap_passthrough(graph: &WorkflowGraph<'_>, id: String) -> String {
    let forwarded = graph.node(&id).and_then(|target| {
        let caps = target.kind().capabilities();
        if caps.role != NodeRole::Passthrough {
            return None;
        }
        caps.forwards.and_then(|field| target.edge(field))
    });
    forwarded.unwrap_or(id)
}

fn resolve_texts(graph: &WorkflowGraph<'_>, ids: &ConditioningIds) -> (String, String) {
    let mut positive = String::new();
    let mut negative = String::new();

    for node in graph.nodes() {
        let caps = node.kind().capabilities();
        let Some(rule) = caps.text else {
            continue;
        };
        let Some(text) = prompt_text(&node, rule) else {
            continue;
        };

        if ids.positive.matches(node.id()) {
            positive = text.to_string();
        } else if ids.negative.matches(node.id()) {
            negative = text.to_string();
        } else if caps.title_fallback {
            let title = node.title();
            if title.contains("negative") || title.contains("nag") {
                if negative.is_empty() {
                    negative = text.to_string();
                }
            } else if positive.is_empty() {
                positive = text.to_string();
            }
        }
    }

    (positive, negative)
}

fn prompt_text<'a>(node: &NodeView<'a>, rule: TextRule) -> Option<&'a str> {
    match rule {
        TextRule::Required(field) => node.text(field),
        TextRule::FirstNonEmpty(fields) => {
            node.inputs()?;
            Some(
                fields
                    .iter()
                    .filter_map(|field| node.text(field))
                    .find(|text| !text.is_empty())
                    .unwrap_or(""),
            )
        }
    }
}

/// Integer value of a numeric literal; floats are truncated toward zero.
///
/// Floats outside the 64-bit integer range (or non-finite) yield `None`.
fn number_to_int(number: &Number) -> Option<i128> {
    if let Some(value) = number.as_i64() {
        return Some(i128::from(value));
    }
    if let Some(value) = number.as_u64() {
        return Some(i128::from(value));
    }
    let value = number.as_f64()?.trunc();
    let in_range = value.is_finite() && value >= i64::MIN as f64 && value < u64::MAX as f64;
    in_range.then(|| value as i128)
}
