//! Front end for the small tensor-comprehension dialect the kernel templates
//! are written in.

use tracing::debug;

use crate::error::{Error, Result};

pub mod lexer;
pub mod lower;
pub mod parser;

use lower::{ConvPlan, ConvShapes};
use parser::Definition;

/// A parsed and lowered entry point. Sizes stay symbolic until [`Program::bind`].
#[derive(Debug, Clone)]
pub struct Program {
    pub definition: Definition,
    pub plan: ConvPlan,
}

pub fn compile(source: &str, entry: &str) -> Result<Program> {
    let definition = parser::parse(source)?
        .into_iter()
        .find(|def| def.name == entry)
        .ok_or_else(|| Error::Unsupported(format!("no definition named `{}`", entry)))?;
    let plan = lower::lower(&definition)?;
    debug!(
        "lowered `{}` to {} with stride {:?}",
        entry, plan.kind, plan.stride
    );

    Ok(Program { definition, plan })
}

impl Program {
    /// Binds the symbolic sizes to `inputs` and returns the concrete
    /// convolution geometry.
    pub fn bind(&self, inputs: &[&[usize]]) -> Result<ConvShapes> {
        lower::bind(&self.definition, inputs)?;
        self.plan.shapes(inputs[0], inputs[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{layer::OperatorKind, template::KernelTemplate};

    #[test]
    fn compiles_entry_point() {
        let text = KernelTemplate::depthwise().instantiate(2).unwrap();
        let program = compile(&text, "convolution").unwrap();

        assert_eq!(program.plan.kind, OperatorKind::DepthwiseConv);
        let shapes = program
            .bind(&[&[1, 8, 114, 114][..], &[8, 3, 3][..]])
            .unwrap();
        assert_eq!(shapes.output_shape(), vec![1, 8, 56, 56]);
    }

    #[test]
    fn missing_entry_point() {
        let text = KernelTemplate::convolution().instantiate(1).unwrap();

        assert!(matches!(
            compile(&text, "matmul"),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn bind_rejects_wrong_input_count() {
        let text = KernelTemplate::convolution().instantiate(1).unwrap();
        let program = compile(&text, "convolution").unwrap();

        assert!(program.bind(&[&[1, 3, 8, 8][..]]).is_err());
    }
}
