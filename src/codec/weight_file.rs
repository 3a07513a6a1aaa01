//! Line-oriented weight file: one numeric token per line.
//!
//! ```text
//! inputSize
//! hiddenSize
//! outputSize
//! nHiddenLayers
//! weights, hidden layer 1   (hiddenSize × inputSize, row-major)
//! weights, hidden layers 2.. (hiddenSize × hiddenSize each)
//! weights, output layer      (outputSize × hiddenSize)
//! biases, every non-input layer in chain order
//! ```
//!
//! Rows are destination neurons, columns source neurons. Lines after the
//! last bias are ignored.

use std::io::{BufRead, Write};

use log::warn;
use serde::{Serialize, Deserialize};

use crate::{
    activation::activation::ActivationFunction,
    error::{FormatError, NetworkError, Result},
    layers::dense::Layer,
    math::matrix::Matrix,
};

const HEADER_LINES: usize = 4;

/// Shape of a network with uniform hidden width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub hidden_layers: usize,
}

impl Topology {
    /// Derives the topology of an assembled layer chain, checking that the
    /// chain is input → hidden × n → output with one hidden width.
    pub fn from_layers(layers: &[Layer]) -> Result<Topology> {
        let (input, rest) = layers.split_first().ok_or(NetworkError::EmptyNetwork)?;
        if !input.is_input() {
            return Err(NetworkError::Structural("first layer must be the input layer".into()));
        }
        if rest.len() < 2 {
            return Err(NetworkError::Structural(format!(
                "chain needs at least one hidden layer and an output layer, found {} non-input layers",
                rest.len()
            )));
        }

        let mut previous_size = input.size;
        for layer in rest {
            match layer.input_size() {
                Some(n) if n == previous_size => {}
                Some(n) => {
                    return Err(NetworkError::Structural(format!(
                        "layer expects {n} inputs but its predecessor has {previous_size} neurons"
                    )))
                }
                None => return Err(NetworkError::Structural("input layer found inside the chain".into())),
            }
            previous_size = layer.size;
        }

        let (output, hidden) = rest.split_last().ok_or(NetworkError::EmptyNetwork)?;
        let hidden_size = hidden[0].size;
        if hidden.iter().any(|l| l.size != hidden_size) {
            return Err(NetworkError::Structural("hidden layers must share one width".into()));
        }

        Ok(Topology {
            input_size: input.size,
            hidden_size,
            output_size: output.size,
            hidden_layers: hidden.len(),
        })
    }

    /// Sizes of every layer in chain order, input first.
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_layers + 2);
        sizes.push(self.input_size);
        sizes.extend(std::iter::repeat(self.hidden_size).take(self.hidden_layers));
        sizes.push(self.output_size);
        sizes
    }
}

/// Total number of lines a well-formed file for `topology` contains.
pub fn expected_line_count(topology: &Topology) -> usize {
    let Topology { input_size, hidden_size, output_size, hidden_layers } = *topology;
    let weights = hidden_size.saturating_mul(input_size)
        .saturating_add(hidden_layers.saturating_sub(1)
            .saturating_mul(hidden_size.saturating_mul(hidden_size)))
        .saturating_add(output_size.saturating_mul(hidden_size));
    let biases = hidden_layers.saturating_mul(hidden_size).saturating_add(output_size);
    HEADER_LINES.saturating_add(weights).saturating_add(biases)
}

struct Tokens {
    lines: Vec<String>,
    pos: usize,
}

impl Tokens {
    /// Next token; the caller has already verified enough lines remain.
    fn next_token(&mut self) -> (usize, &str) {
        let line = self.pos + 1;
        self.pos += 1;
        (line, self.lines[line - 1].trim())
    }

    fn next_dimension(&mut self) -> Result<i64> {
        let (line, token) = self.next_token();
        token.parse::<i64>().map_err(|_| {
            FormatError::NotANumber { line, token: token.to_string() }.into()
        })
    }

    fn next_value(&mut self) -> Result<f64> {
        let (line, token) = self.next_token();
        token.parse::<f64>().map_err(|_| {
            FormatError::NotANumber { line, token: token.to_string() }.into()
        })
    }

    fn next_values(&mut self, n: usize) -> Result<Vec<f64>> {
        (0..n).map(|_| self.next_value()).collect()
    }
}

fn positive(field: &'static str, value: i64) -> Result<usize> {
    if value <= 0 {
        return Err(FormatError::InvalidDimension { field, value }.into());
    }
    usize::try_from(value).map_err(|_| FormatError::InvalidDimension { field, value }.into())
}

fn read_header(tokens: &mut Tokens) -> Result<Topology> {
    let input = tokens.next_dimension()?;
    let hidden = tokens.next_dimension()?;
    let output = tokens.next_dimension()?;
    let layers = tokens.next_dimension()?;

    if layers == 0 {
        return Err(FormatError::NoHiddenLayers.into());
    }
    Ok(Topology {
        input_size: positive("input size", input)?,
        hidden_size: positive("hidden size", hidden)?,
        output_size: positive("output size", output)?,
        hidden_layers: positive("hidden layer count", layers)?,
    })
}

/// Parses a weight file into a layer chain, input layer first.
///
/// The format carries no activation ids: hidden layers get `hidden`, the
/// output layer gets `output`.
pub fn read_weights<R: BufRead>(
    reader: R,
    hidden: ActivationFunction,
    output: ActivationFunction,
) -> Result<(Topology, Vec<Layer>)> {
    let lines = reader.lines().collect::<std::io::Result<Vec<String>>>()?;
    if lines.len() < HEADER_LINES {
        return Err(FormatError::Truncated { expected: HEADER_LINES, found: lines.len() }.into());
    }

    let mut tokens = Tokens { lines, pos: 0 };
    let topology = read_header(&mut tokens)?;

    let expected = expected_line_count(&topology);
    let found = tokens.lines.len();
    if found < expected {
        return Err(FormatError::Truncated { expected, found }.into());
    }
    if found > expected {
        warn!("ignoring {} trailing lines after the last bias", found - expected);
    }

    let sizes = topology.layer_sizes();
    let mut weights = Vec::with_capacity(sizes.len() - 1);
    for pair in sizes.windows(2) {
        let (cols, rows) = (pair[0], pair[1]);
        let values = tokens.next_values(rows * cols)?;
        weights.push(Matrix::from_flat(rows, cols, &values)?);
    }

    let mut layers = Vec::with_capacity(sizes.len());
    layers.push(Layer::input(topology.input_size));
    let last = weights.len() - 1;
    for (i, matrix) in weights.into_iter().enumerate() {
        let biases = tokens.next_values(matrix.rows)?;
        let activation = if i == last { output } else { hidden };
        layers.push(Layer::with_params(matrix, biases, activation)?);
    }

    Ok((topology, layers))
}

/// Writes a layer chain in the weight file format.
///
/// Values use the shortest representation that parses back to the same
/// `f64`, so a load/save cycle reproduces every number exactly.
pub fn write_weights<W: Write>(layers: &[Layer], mut writer: W) -> Result<Topology> {
    let topology = Topology::from_layers(layers)?;
    writeln!(writer, "{}", topology.input_size)?;
    writeln!(writer, "{}", topology.hidden_size)?;
    writeln!(writer, "{}", topology.output_size)?;
    writeln!(writer, "{}", topology.hidden_layers)?;

    for weights in layers.iter().filter_map(Layer::weights) {
        for w in weights.iter_flat() {
            writeln!(writer, "{w}")?;
        }
    }
    for biases in layers.iter().filter_map(Layer::biases) {
        for b in biases {
            writeln!(writer, "{b}")?;
        }
    }
    writer.flush()?;
    Ok(topology)
}
