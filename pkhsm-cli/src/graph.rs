//! Rendering of dependency graphs.

use std::io::Write;

use pkhsm_engine::{EdgeKind, Graph};

/// Writes the waves of `graph` to `writer`.
///
/// Every node is listed with its kind.
/// Explicit dependencies are listed below the node they order.
///
/// # Examples
///
/// ```
/// use pkhsm_cli::graph::render;
/// use pkhsm_engine::{Inputs, ResourceOptions, Stack};
///
/// # fn main() -> testresult::TestResult {
/// let mut stack = Stack::new("example");
/// stack.resource(
///     "aws:ec2/vpc:Vpc",
///     "vpc",
///     Inputs::new(),
///     ResourceOptions::new(),
/// )?;
///
/// let mut output = Vec::new();
/// render(&stack.graph()?, &mut output)?;
/// assert_eq!(
///     String::from_utf8(output)?,
///     "wave 0\n  resource aws:ec2/vpc:Vpc::vpc\n"
/// );
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if writing to `writer` fails.
pub fn render(graph: &Graph, mut writer: impl Write) -> std::io::Result<()> {
    for (index, wave) in graph.waves().iter().enumerate() {
        writeln!(writer, "wave {index}")?;
        for urn in wave {
            let kind = graph
                .kind(urn)
                .map(|kind| kind.to_string())
                .unwrap_or_default();
            writeln!(writer, "  {kind} {urn}")?;
            for edge in graph
                .edges()
                .iter()
                .filter(|edge| &edge.to == urn && edge.kind == EdgeKind::Explicit)
            {
                writeln!(writer, "    after {} ({})", edge.from, edge.kind)?;
            }
        }
    }
    Ok(())
}
