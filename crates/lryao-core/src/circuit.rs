//! Boolean circuits.

use serde::{Deserialize, Serialize};

/// A party providing inputs to a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    /// The garbler.
    P1,
    /// The evaluator.
    P2,
}

impl Party {
    fn index(self) -> usize {
        match self {
            Party::P1 => 0,
            Party::P2 => 1,
        }
    }
}

/// A boolean gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gate {
    /// XOR gate.
    Xor { x: usize, y: usize, z: usize },
    /// AND gate.
    And { x: usize, y: usize, z: usize },
    /// Inverter.
    Inv { x: usize, z: usize },
}

/// Errors that can occur while building or evaluating a circuit.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum CircuitError {
    #[error("circuit has no outputs")]
    NoOutputs,
    #[error("wire {0} is read before it is assigned")]
    UnassignedWire(usize),
    #[error("invalid input count for {party:?}: expected {expected}, got {actual}")]
    InvalidInputCount {
        party: Party,
        expected: usize,
        actual: usize,
    },
}

/// A boolean circuit with two input parties.
///
/// Input wires of P1 come first in the flattened input order, followed by the input wires of P2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    wire_count: usize,
    inputs: [Vec<usize>; 2],
    outputs: Vec<usize>,
    gates: Vec<Gate>,
    and_count: usize,
}

impl Circuit {
    /// Returns the number of wires.
    pub fn wire_count(&self) -> usize {
        self.wire_count
    }

    /// Returns the input wires of a party.
    pub fn input_wires(&self, party: Party) -> &[usize] {
        &self.inputs[party.index()]
    }

    /// Returns the number of inputs of a party.
    pub fn input_count(&self, party: Party) -> usize {
        self.inputs[party.index()].len()
    }

    /// Returns the total number of inputs.
    pub fn input_len(&self) -> usize {
        self.inputs[0].len() + self.inputs[1].len()
    }

    /// Returns the input wires in flattened order, P1 first.
    pub fn all_input_wires(&self) -> impl Iterator<Item = usize> + '_ {
        self.inputs[0].iter().chain(self.inputs[1].iter()).copied()
    }

    /// Returns the output wires.
    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    /// Returns the gates, in topological order.
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Returns the number of AND gates.
    pub fn and_count(&self) -> usize {
        self.and_count
    }

    /// Evaluates the circuit in the clear.
    pub fn evaluate(&self, p1: &[bool], p2: &[bool]) -> Result<Vec<bool>, CircuitError> {
        for (party, input) in [(Party::P1, p1), (Party::P2, p2)] {
            if input.len() != self.input_count(party) {
                return Err(CircuitError::InvalidInputCount {
                    party,
                    expected: self.input_count(party),
                    actual: input.len(),
                });
            }
        }

        let mut wires = vec![false; self.wire_count];
        for (wire, value) in self.all_input_wires().zip(p1.iter().chain(p2)) {
            wires[wire] = *value;
        }

        for gate in &self.gates {
            match *gate {
                Gate::Xor { x, y, z } => wires[z] = wires[x] ^ wires[y],
                Gate::And { x, y, z } => wires[z] = wires[x] & wires[y],
                Gate::Inv { x, z } => wires[z] = !wires[x],
            }
        }

        Ok(self.outputs.iter().map(|wire| wires[*wire]).collect())
    }
}

/// Builds a [`Circuit`] gate by gate.
#[derive(Debug, Default)]
pub struct CircuitBuilder {
    wire_count: usize,
    assigned: Vec<bool>,
    inputs: [Vec<usize>; 2],
    outputs: Vec<usize>,
    gates: Vec<Gate>,
    and_count: usize,
    error: Option<usize>,
}

impl CircuitBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn new_wire(&mut self) -> usize {
        let wire = self.wire_count;
        self.wire_count += 1;
        self.assigned.push(true);
        wire
    }

    fn check(&mut self, wire: usize) {
        if !self.assigned.get(wire).copied().unwrap_or(false) && self.error.is_none() {
            self.error = Some(wire);
        }
    }

    /// Adds an input wire for a party.
    pub fn add_input(&mut self, party: Party) -> usize {
        let wire = self.new_wire();
        self.inputs[party.index()].push(wire);
        wire
    }

    /// Adds `count` input wires for a party.
    pub fn add_inputs(&mut self, party: Party, count: usize) -> Vec<usize> {
        (0..count).map(|_| self.add_input(party)).collect()
    }

    /// Adds an XOR gate, returning the output wire.
    pub fn xor(&mut self, x: usize, y: usize) -> usize {
        self.check(x);
        self.check(y);
        let z = self.new_wire();
        self.gates.push(Gate::Xor { x, y, z });
        z
    }

    /// Adds an AND gate, returning the output wire.
    pub fn and(&mut self, x: usize, y: usize) -> usize {
        self.check(x);
        self.check(y);
        let z = self.new_wire();
        self.gates.push(Gate::And { x, y, z });
        self.and_count += 1;
        z
    }

    /// Adds an inverter, returning the output wire.
    pub fn inv(&mut self, x: usize) -> usize {
        self.check(x);
        let z = self.new_wire();
        self.gates.push(Gate::Inv { x, z });
        z
    }

    /// Marks a wire as a circuit output.
    pub fn add_output(&mut self, wire: usize) {
        self.check(wire);
        self.outputs.push(wire);
    }

    /// Builds the circuit.
    pub fn build(self) -> Result<Circuit, CircuitError> {
        if let Some(wire) = self.error {
            return Err(CircuitError::UnassignedWire(wire));
        }

        if self.outputs.is_empty() {
            return Err(CircuitError::NoOutputs);
        }

        Ok(Circuit {
            wire_count: self.wire_count,
            inputs: self.inputs,
            outputs: self.outputs,
            gates: self.gates,
            and_count: self.and_count,
        })
    }
}
