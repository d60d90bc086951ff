//! Expression graph and layered-circuit lowering
//!
//! The front-end builds a DAG of scalar operations over quantized values; the
//! back half of this module lowers that DAG into the padded, depth-ordered
//! [`LayeredCircuit`] the prover consumes.
//!
//! The graph is an arena: nodes live in a `Vec` and refer to each other by
//! [`NodeId`] index, so ownership cycles cannot form and consumer lists are
//! plain back-references. The builder also owns the working layer list; it is
//! released on every exit path of [`GraphBuilder::compile_layered_circuit`],
//! and `&mut self` statically rules out concurrent builds.
//!
//! Non-linear operations (`tanh`, `exp`, `log`, `relu`, integer powers) are
//! lowered eagerly at construction time into a single multiplication
//! `x · (f(x)/x)` with a synthesized right operand, so the runtime circuit
//! only ever contains `Input`, `Add`, `Mul` and `Relay` gates. The
//! synthesized value is rounded to five decimal places before quantization;
//! that rounding is what keeps independently built graphs bit-identical.

#![forbid(unsafe_code)]

use ark_ff::Zero;
use std::collections::HashMap;

use crate::circuit::{Gate, GateType, Layer, LayeredCircuit};
use crate::fixed_point::{
    dequantize, qadd, qdiv, qexp, qlt, qmul, quantize, round5, FixedPointError,
};
use crate::F;

/// Hard cap on a padded layer: `2^31` gate slots.
const MAX_LAYER_SIZE: usize = 1 << 31;

/// Index of a node in the builder's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Operator carried by a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOp {
    /// Leaf carrying a quantized constant.
    Input,
    /// Field addition of both children.
    Add,
    /// Field multiplication of both children.
    Mul,
    /// Forwards its single (left) child unchanged.
    Relay,
}

#[derive(Debug, Clone)]
struct Node {
    value: F,
    op: NodeOp,
    left: Option<NodeId>,
    right: Option<NodeId>,
    layer: Option<usize>,
    consumers: Vec<NodeId>,
    placed: bool,
    dummy: bool,
}

impl Node {
    fn leaf(value: F) -> Self {
        Node {
            value,
            op: NodeOp::Input,
            left: None,
            right: None,
            layer: None,
            consumers: Vec::new(),
            placed: false,
            dummy: false,
        }
    }
}

/// Errors raised while building or lowering a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A padded layer would exceed `2^31` slots.
    #[error("circuit too large: a layer needs more than 2^31 slots")]
    CircuitTooLarge,
    /// A gate was emitted with neither child index resolvable.
    #[error("malformed node at layer {layer}: {detail}")]
    MalformedNode {
        /// Layer holding the offending node.
        layer: usize,
        /// What went wrong.
        detail: &'static str,
    },
    /// A non-linear operation was applied outside its domain.
    #[error("invalid operand for {0}")]
    InvalidOperand(&'static str),
    /// Quantized arithmetic failed while computing a node value.
    #[error(transparent)]
    FixedPoint(#[from] FixedPointError),
}

/// Arena-backed expression-graph builder.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    layers: Vec<Vec<NodeId>>,
}

impl GraphBuilder {
    /// Fresh builder with an empty arena.
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    /// Quantized value held by `id`.
    pub fn value(&self, id: NodeId) -> F {
        self.nodes[id.0].value
    }

    /// Decoded real value held by `id`.
    pub fn real_value(&self, id: NodeId) -> f64 {
        dequantize(&self.nodes[id.0].value)
    }

    // ------------------------------------------------------------------
    // Node constructors
    // ------------------------------------------------------------------

    /// Leaf node from a real constant.
    pub fn input(&mut self, x: f64) -> NodeId {
        self.push(Node::leaf(quantize(x)))
    }

    /// Leaf node from an already-encoded field element.
    pub fn input_fe(&mut self, value: F) -> NodeId {
        self.push(Node::leaf(value))
    }

    /// `a + b`.
    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let value = qadd(&self.value(a), &self.value(b));
        self.combine(NodeOp::Add, a, b, value)
    }

    /// `a · b`.
    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let value = qmul(&self.value(a), &self.value(b));
        self.combine(NodeOp::Mul, a, b, value)
    }

    /// `−a`, lowered as `a · (−1)`.
    pub fn neg(&mut self, a: NodeId) -> NodeId {
        let minus_one = self.input(-1.0);
        self.mul(a, minus_one)
    }

    /// `a − b`, lowered as `a + (−b)`.
    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let nb = self.neg(b);
        self.add(a, nb)
    }

    /// `a / b`, lowered as `a · b⁻¹`.
    pub fn div(&mut self, a: NodeId, b: NodeId) -> Result<NodeId, GraphError> {
        let inv = self.pow(b, -1)?;
        Ok(self.mul(a, inv))
    }

    /// `a^k` for an integer `k`, lowered as `a · (a^k / a)`.
    pub fn pow(&mut self, a: NodeId, k: i64) -> Result<NodeId, GraphError> {
        let av = self.value(a);
        let t = qexp(&av, k)?;
        let ratio = qdiv(&t, &av)?;
        Ok(self.mul_with_synthesized(a, ratio, t))
    }

    /// Hyperbolic tangent, lowered as `x · (tanh(x)/x)`.
    pub fn tanh(&mut self, a: NodeId) -> Result<NodeId, GraphError> {
        let x = self.real_value(a);
        let t = quantize(round5(x.tanh()));
        let ratio = qdiv(&t, &self.value(a))?;
        Ok(self.mul_with_synthesized(a, ratio, t))
    }

    /// Exponential, lowered as `x · (eˣ/x)`.
    pub fn exp(&mut self, a: NodeId) -> Result<NodeId, GraphError> {
        let x = self.real_value(a);
        let t = quantize(round5(x.exp()));
        let ratio = qdiv(&t, &self.value(a))?;
        Ok(self.mul_with_synthesized(a, ratio, t))
    }

    /// Natural logarithm, lowered as `x · (ln(x)/x)`.
    pub fn log(&mut self, a: NodeId) -> Result<NodeId, GraphError> {
        let x = self.real_value(a);
        if x <= 0.0 {
            return Err(GraphError::InvalidOperand("log"));
        }
        let t = quantize(round5(x.ln()));
        let ratio = qdiv(&t, &self.value(a))?;
        Ok(self.mul_with_synthesized(a, ratio, t))
    }

    /// Rectifier, lowered as `x · (relu(x)/x)`.
    pub fn relu(&mut self, a: NodeId) -> Result<NodeId, GraphError> {
        let av = self.value(a);
        let zero = F::zero();
        let t = if qlt(&av, &zero) { zero } else { av };
        let ratio = if av.is_zero() { zero } else { qdiv(&t, &av)? };
        Ok(self.mul_with_synthesized(a, ratio, t))
    }

    // ------------------------------------------------------------------
    // Construction internals
    // ------------------------------------------------------------------

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// `x · r` where `r` is a fresh leaf carrying `ratio`.
    fn mul_with_synthesized(&mut self, x: NodeId, ratio: F, out_value: F) -> NodeId {
        let right = self.push(Node::leaf(ratio));
        self.combine(NodeOp::Mul, x, right, out_value)
    }

    fn combine(&mut self, op: NodeOp, left: NodeId, right: NodeId, value: F) -> NodeId {
        let out = self.push(Node {
            value,
            op,
            left: Some(left),
            right: Some(right),
            layer: None,
            consumers: Vec::new(),
            placed: false,
            dummy: false,
        });
        self.assign_layers(left, right, out);
        self.nodes[left.0].consumers.push(out);
        self.nodes[right.0].consumers.push(out);
        out
    }

    /// On-the-fly layer assignment.
    ///
    /// An unassigned operand inherits its partner's layer; when neither has
    /// one yet, both land at layer 0 (or 1 once any layer exists). The
    /// output always sits one above the deeper operand; multi-layer gaps are
    /// bridged later with relays.
    fn assign_layers(&mut self, left: NodeId, right: NodeId, out: NodeId) {
        let ll = self.nodes[left.0].layer;
        let rl = self.nodes[right.0].layer;
        match (ll, rl) {
            (Some(l), None) => self.nodes[right.0].layer = Some(l),
            (None, Some(r)) => self.nodes[left.0].layer = Some(r),
            (None, None) => {
                let base = usize::from(!self.layers.is_empty());
                self.nodes[left.0].layer = Some(base);
                self.nodes[right.0].layer = Some(base);
            }
            (Some(_), Some(_)) => {}
        }
        let l = self.nodes[left.0].layer.unwrap_or(0);
        let r = self.nodes[right.0].layer.unwrap_or(0);
        self.nodes[out.0].layer = Some(l.max(r) + 1);
        self.place(left);
        self.place(right);
        self.place(out);
    }

    fn place(&mut self, id: NodeId) {
        if self.nodes[id.0].placed {
            return;
        }
        let layer = self.nodes[id.0].layer.unwrap_or(0);
        while self.layers.len() <= layer {
            self.layers.push(Vec::new());
        }
        self.layers[layer].push(id);
        self.nodes[id.0].placed = true;
    }

    // ------------------------------------------------------------------
    // Lowering
    // ------------------------------------------------------------------

    /// Lower the graph rooted at `output` into a layered circuit.
    ///
    /// The working layer list is released whether or not lowering succeeds,
    /// so the builder can be reused for a fresh graph afterwards.
    pub fn compile_layered_circuit(
        &mut self,
        output: NodeId,
    ) -> Result<LayeredCircuit, GraphError> {
        let result = self.compile_inner(output);
        self.layers.clear();
        result
    }

    fn compile_inner(&mut self, output: NodeId) -> Result<LayeredCircuit, GraphError> {
        let out_layer = self.nodes[output.0].layer.ok_or(GraphError::MalformedNode {
            layer: 0,
            detail: "output node is not part of any operation",
        })?;
        if out_layer + 1 != self.layers.len() {
            return Err(GraphError::MalformedNode {
                layer: out_layer,
                detail: "output node is not the deepest node in the graph",
            });
        }
        self.ground_floating_nodes();
        self.bridge_gaps();
        self.pad_layers()?;
        self.emit()
    }

    /// Connect interior nodes with no concrete input (constants synthesized
    /// during construction) to layer 0 through a chain of relays ending in a
    /// fresh input node.
    fn ground_floating_nodes(&mut self) {
        for l in 1..self.layers.len() {
            for id in self.layers[l].clone() {
                let node = &self.nodes[id.0];
                if node.left.is_some() || node.right.is_some() {
                    continue;
                }
                let value = node.value;
                let mut cur = id;
                let mut cl = l;
                while cl > 0 {
                    let below = self.push(Node {
                        layer: Some(cl - 1),
                        ..Node::leaf(value)
                    });
                    self.place(below);
                    self.nodes[cur.0].op = NodeOp::Relay;
                    self.nodes[cur.0].left = Some(below);
                    self.nodes[cur.0].right = None;
                    self.nodes[below.0].consumers.push(cur);
                    cur = below;
                    cl -= 1;
                }
            }
        }
    }

    /// Insert a relay chain for every edge spanning more than one layer and
    /// rewire the consumer onto the topmost relay.
    fn bridge_gaps(&mut self) {
        for l in 0..self.layers.len() {
            for id in self.layers[l].clone() {
                for consumer in self.nodes[id.0].consumers.clone() {
                    let cl = match self.nodes[consumer.0].layer {
                        Some(cl) => cl,
                        None => continue,
                    };
                    if cl <= l + 1 {
                        continue;
                    }
                    // Already rewired through an earlier chain.
                    let holds_edge = self.nodes[consumer.0].left == Some(id)
                        || self.nodes[consumer.0].right == Some(id);
                    if !holds_edge {
                        continue;
                    }
                    let value = self.nodes[id.0].value;
                    let mut prev = id;
                    for target in (l + 1)..cl {
                        let relay = self.push(Node {
                            op: NodeOp::Relay,
                            left: Some(prev),
                            layer: Some(target),
                            ..Node::leaf(value)
                        });
                        self.place(relay);
                        self.nodes[prev.0].consumers.push(relay);
                        prev = relay;
                    }
                    if self.nodes[consumer.0].left == Some(id) {
                        self.nodes[consumer.0].left = Some(prev);
                    }
                    if self.nodes[consumer.0].right == Some(id) {
                        self.nodes[consumer.0].right = Some(prev);
                    }
                    self.nodes[prev.0].consumers.push(consumer);
                }
            }
        }
    }

    /// Grow every layer to a power of two, working output-inward so that each
    /// layer ends up at least as large as its consumer layer: gates in layer
    /// `k` may then index anywhere up to `size(k) ≤ size(k − 1)`.
    fn pad_layers(&mut self) -> Result<(), GraphError> {
        let depth = self.layers.len();
        if depth == 0 {
            return Ok(());
        }
        let target = padded_size(self.layers[depth - 1].len())?;
        self.pad_layer(depth - 1, target);
        for l in (0..depth.saturating_sub(1)).rev() {
            let above = self.layers[l + 1].len();
            let target = padded_size(self.layers[l].len().max(above))?;
            self.pad_layer(l, target);
        }
        Ok(())
    }

    fn pad_layer(&mut self, l: usize, target: usize) {
        while self.layers[l].len() < target {
            let dummy = self.push(Node {
                op: NodeOp::Relay,
                layer: Some(l),
                dummy: true,
                ..Node::leaf(F::zero())
            });
            self.place(dummy);
        }
    }

    /// Emit gates layer by layer. Positions are resolved against the final
    /// padded layout, which subsumes the incremental child-index caches the
    /// construction phase maintains.
    fn emit(&mut self) -> Result<LayeredCircuit, GraphError> {
        let depth = self.layers.len();
        let mut layers = Vec::with_capacity(depth);
        let mut below_pos: HashMap<NodeId, usize> = HashMap::new();
        for l in 0..depth {
            let ids = &self.layers[l];
            let mut gates = Vec::with_capacity(ids.len());
            if l == 0 {
                for &id in ids {
                    gates.push(Gate::input(self.nodes[id.0].value));
                }
            } else {
                for (pos, &id) in ids.iter().enumerate() {
                    let node = &self.nodes[id.0];
                    if node.dummy {
                        // Dummy padding relay forwards its own slot.
                        gates.push(Gate::new(GateType::Relay, pos as u32, 0));
                        continue;
                    }
                    let gate = match node.op {
                        NodeOp::Add | NodeOp::Mul => {
                            let u = self.resolve(&below_pos, node.left, l)?;
                            let v = self.resolve(&below_pos, node.right, l)?;
                            let ty = if node.op == NodeOp::Add {
                                GateType::Add
                            } else {
                                GateType::Mul
                            };
                            Gate::new(ty, u, v)
                        }
                        NodeOp::Relay => {
                            // A relay missing its left source falls back to
                            // the right slot.
                            let src = node.left.or(node.right);
                            let u = self.resolve(&below_pos, src, l)?;
                            Gate::new(GateType::Relay, u, 0)
                        }
                        NodeOp::Input => {
                            return Err(GraphError::MalformedNode {
                                layer: l,
                                detail: "ungrounded input node above layer 0",
                            })
                        }
                    };
                    gates.push(gate);
                }
            }
            let size = ids.len();
            let bit_length = if size > 1 {
                size.trailing_zeros() as u8
            } else {
                1
            };
            layers.push(Layer {
                gates,
                bit_length,
                size: size as u32,
            });
            below_pos = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        }
        Ok(LayeredCircuit { layers })
    }

    fn resolve(
        &self,
        below_pos: &HashMap<NodeId, usize>,
        child: Option<NodeId>,
        layer: usize,
    ) -> Result<u32, GraphError> {
        let id = child.ok_or(GraphError::MalformedNode {
            layer,
            detail: "gate has no resolvable child index",
        })?;
        below_pos
            .get(&id)
            .map(|&p| p as u32)
            .ok_or(GraphError::MalformedNode {
                layer,
                detail: "child does not live in the previous layer",
            })
    }
}

/// Smallest power of two ≥ `max(n, 2)`, capped at `2^31`.
fn padded_size(n: usize) -> Result<usize, GraphError> {
    if n > MAX_LAYER_SIZE {
        return Err(GraphError::CircuitTooLarge);
    }
    Ok(n.next_power_of_two().max(2))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::GateType;

    fn scalar_chain(builder: &mut GraphBuilder) -> NodeId {
        let a = builder.input(1.0);
        let b = builder.input(2.0);
        let mut c = builder.add(a, b);
        for k in 1..3 {
            let one = builder.input(k as f64);
            c = builder.mul(c, one);
        }
        c
    }

    #[test]
    fn scalar_chain_compiles_with_expected_shape() {
        let mut builder = GraphBuilder::new();
        let out = scalar_chain(&mut builder);
        let circuit = builder.compile_layered_circuit(out).unwrap();
        assert_eq!(circuit.total_depth(), 4);
        for layer in &circuit.layers {
            assert_eq!(layer.len(), 1usize << layer.bit_len());
        }
        // Layer sizes never grow toward the output.
        for w in circuit.layers.windows(2) {
            assert!(w[0].len() >= w[1].len());
        }
    }

    #[test]
    fn gate_indices_stay_inside_the_previous_layer() {
        let mut builder = GraphBuilder::new();
        let out = scalar_chain(&mut builder);
        let circuit = builder.compile_layered_circuit(out).unwrap();
        for l in 1..circuit.total_depth() {
            let prev = circuit.layers[l - 1].len() as u32;
            for gate in &circuit.layers[l].gates {
                assert!(gate.u < prev && gate.v < prev);
            }
        }
    }

    #[test]
    fn compilation_is_deterministic() {
        let compile = || {
            let mut builder = GraphBuilder::new();
            let out = scalar_chain(&mut builder);
            builder.compile_layered_circuit(out).unwrap()
        };
        let c1 = compile();
        let c2 = compile();
        assert_eq!(c1.total_depth(), c2.total_depth());
        for (l1, l2) in c1.layers.iter().zip(&c2.layers) {
            assert_eq!(l1.bit_length, l2.bit_length);
            assert_eq!(l1.size, l2.size);
            let g1: Vec<_> = l1.gates.iter().map(|g| (g.ty, g.u, g.v, g.c)).collect();
            let g2: Vec<_> = l2.gates.iter().map(|g| (g.ty, g.u, g.v, g.c)).collect();
            assert_eq!(g1, g2);
        }
    }

    #[test]
    fn output_value_matches_field_evaluation() {
        let mut builder = GraphBuilder::new();
        let out = scalar_chain(&mut builder);
        let circuit = builder.compile_layered_circuit(out).unwrap();

        // Evaluate the compiled circuit with plain field semantics.
        let mut values: Vec<Vec<F>> = Vec::new();
        for (l, layer) in circuit.layers.iter().enumerate() {
            let mut row = Vec::with_capacity(layer.len());
            for gate in &layer.gates {
                let val = match gate.ty {
                    GateType::Input => gate.c,
                    GateType::Add => values[l - 1][gate.u as usize] + values[l - 1][gate.v as usize],
                    GateType::Mul => values[l - 1][gate.u as usize] * values[l - 1][gate.v as usize],
                    GateType::Relay => values[l - 1][gate.u as usize],
                    _ => unreachable!("compiler only emits input/add/mul/relay"),
                };
                row.push(val);
            }
            values.push(row);
        }
        let expected = (quantize(1.0) + quantize(2.0)) * quantize(1.0) * quantize(2.0);
        assert_eq!(values.last().unwrap()[0], expected);
    }

    #[test]
    fn matrix_vector_product_compiles_to_depth_four() {
        let mut builder = GraphBuilder::new();
        let a = [[1.0, 2.0], [2.0, 1.0]];
        let b = [3.0, 4.0];
        let a00 = builder.input(a[0][0]);
        let b0 = builder.input(b[0]);
        let a01 = builder.input(a[0][1]);
        let b1 = builder.input(b[1]);
        let m0 = builder.mul(a00, b0);
        let m1 = builder.mul(a01, b1);
        let c0 = builder.add(m0, m1);
        let circuit = builder.compile_layered_circuit(c0).unwrap();
        assert_eq!(circuit.size(), 4);
    }

    #[test]
    fn relu_of_a_negative_is_zero() {
        let mut builder = GraphBuilder::new();
        let x = builder.input(-2.5);
        let r = builder.relu(x).unwrap();
        assert_eq!(builder.value(r), F::zero());
        let y = builder.input(2.5);
        let r = builder.relu(y).unwrap();
        assert_eq!(builder.real_value(r), 2.5);
    }

    #[test]
    fn nonlinear_values_use_five_decimal_rounding() {
        let mut builder = GraphBuilder::new();
        let x = builder.input(1.0);
        let t = builder.tanh(x).unwrap();
        // tanh(1) = 0.76159…, rounded to five places before quantization.
        let expected = round5(1.0f64.tanh());
        assert!((builder.real_value(t) - expected).abs() < 2.0 / 65536.0);
    }

    #[test]
    fn log_rejects_nonpositive_operands() {
        let mut builder = GraphBuilder::new();
        let x = builder.input(-1.0);
        assert!(matches!(
            builder.log(x),
            Err(GraphError::InvalidOperand("log"))
        ));
    }

    #[test]
    fn builder_is_reusable_after_compilation() {
        let mut builder = GraphBuilder::new();
        let out = scalar_chain(&mut builder);
        builder.compile_layered_circuit(out).unwrap();
        // The layer list was released; a fresh graph starts clean.
        let a = builder.input(5.0);
        let b = builder.input(6.0);
        let c = builder.add(a, b);
        let circuit = builder.compile_layered_circuit(c).unwrap();
        assert_eq!(circuit.total_depth(), 2);
    }
}
