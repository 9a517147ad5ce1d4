use std::{collections::HashMap, iter::zip};

use crate::{
    error::{Error, Result},
    layer::OperatorKind,
};

use super::parser::{Affine, AssignOp, Definition, Term};

/// Binds every size symbol of the parameters to the matching dimension of
/// the given input shapes.
pub fn bind(def: &Definition, shapes: &[&[usize]]) -> Result<HashMap<String, usize>> {
    if shapes.len() != def.params.len() {
        return Err(Error::ShapeMismatch {
            symbol: def.name.clone(),
            message: format!("expected {} inputs, got {}", def.params.len(), shapes.len()),
        });
    }

    let mut bindings: HashMap<String, usize> = HashMap::new();
    for (param, shape) in zip(&def.params, shapes) {
        if param.sizes.len() != shape.len() {
            return Err(Error::ShapeMismatch {
                symbol: param.name.clone(),
                message: format!(
                    "declared with rank {} but got shape {:?}",
                    param.sizes.len(),
                    shape
                ),
            });
        }

        for (symbol, &size) in zip(&param.sizes, shape.iter()) {
            match bindings.get(symbol) {
                Some(&bound) if bound != size => {
                    return Err(Error::ShapeMismatch {
                        symbol: symbol.clone(),
                        message: format!(
                            "bound to {} but {} has {} in that position",
                            bound, param.name, size
                        ),
                    });
                }
                Some(_) => {}
                None => {
                    bindings.insert(symbol.clone(), size);
                }
            }
        }
    }

    Ok(bindings)
}

/// A recognised convolution statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvPlan {
    pub kind: OperatorKind,
    pub stride: (usize, usize),
    pub input: String,
    pub kernel: String,
}

/// Concrete sizes of one convolution instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvShapes {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub out_channels: usize,
    pub kernel_height: usize,
    pub kernel_width: usize,
    pub out_height: usize,
    pub out_width: usize,
    pub stride: (usize, usize),
}

impl ConvShapes {
    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.batch, self.out_channels, self.out_height, self.out_width]
    }

    pub fn output_len(&self) -> usize {
        self.batch * self.out_channels * self.out_height * self.out_width
    }
}

impl ConvPlan {
    pub fn shapes(&self, input: &[usize], kernel: &[usize]) -> Result<ConvShapes> {
        let mismatch = |symbol: &str, message: String| Error::ShapeMismatch {
            symbol: symbol.to_owned(),
            message,
        };

        if input.len() != 4 {
            return Err(mismatch(
                &self.input,
                format!("expected [N, C, H, W], got {:?}", input),
            ));
        }
        let (batch, channels, height, width) = (input[0], input[1], input[2], input[3]);

        let (out_channels, kernel_channels, kernel_height, kernel_width) = match (self.kind, kernel)
        {
            (OperatorKind::StandardConv, &[m, c, kh, kw]) => (m, c, kh, kw),
            (OperatorKind::DepthwiseConv, &[c, kh, kw]) => (c, c, kh, kw),
            _ => {
                return Err(mismatch(
                    &self.kernel,
                    format!("{} kernel cannot have shape {:?}", self.kind, kernel),
                ))
            }
        };

        if kernel_channels != channels {
            return Err(mismatch(
                "C",
                format!(
                    "{} has {} channels but {} expects {}",
                    self.input, channels, self.kernel, kernel_channels
                ),
            ));
        }
        if kernel_height > height || kernel_width > width {
            return Err(mismatch(
                "KH",
                format!(
                    "kernel {}x{} does not fit input {}x{}",
                    kernel_height, kernel_width, height, width
                ),
            ));
        }

        Ok(ConvShapes {
            batch,
            channels,
            height,
            width,
            out_channels,
            kernel_height,
            kernel_width,
            out_height: (height - kernel_height) / self.stride.0 + 1,
            out_width: (width - kernel_width) / self.stride.1 + 1,
            stride: self.stride,
        })
    }
}

/// Splits `h * S + r_kh` (in either order) into the stride and the
/// reduction index.
fn strided(expr: &Affine, output_index: &str) -> Option<(usize, String)> {
    match expr.terms.as_slice() {
        [Term::Scaled(a, s), Term::Index(r)] | [Term::Index(r), Term::Scaled(a, s)]
            if a == output_index && r != output_index =>
        {
            Some((*s, r.clone()))
        }
        [Term::Index(a), Term::Index(r)] if a == output_index && r != output_index => {
            Some((1, r.clone()))
        }
        [Term::Index(r), Term::Index(a)] if a == output_index && r != output_index => {
            Some((1, r.clone()))
        }
        _ => None,
    }
}

pub fn lower(def: &Definition) -> Result<ConvPlan> {
    let unsupported = |message: &str| Error::Unsupported(format!("{}: {}", def.name, message));

    if def.params.len() != 2 {
        return Err(unsupported("expected an input and a kernel parameter"));
    }
    if def.outputs.len() != 1 || def.statements.len() != 1 {
        return Err(unsupported("expected a single output written by one statement"));
    }

    let stmt = &def.statements[0];
    if stmt.output != def.outputs[0] {
        return Err(unsupported("statement does not write the declared output"));
    }
    if stmt.op == AssignOp::Set {
        return Err(unsupported("expected a sum reduction"));
    }

    let (input, kernel) = match stmt.factors.as_slice() {
        [input, kernel]
            if input.tensor == def.params[0].name && kernel.tensor == def.params[1].name =>
        {
            (input, kernel)
        }
        _ => return Err(unsupported("expected the product of input and kernel")),
    };

    let (n, o, h, w) = match stmt.indices.as_slice() {
        [n, o, h, w] => (n, o, h, w),
        _ => return Err(unsupported("expected a 4-d output")),
    };

    if input.indices.len() != 4 || def.params[0].sizes.len() != 4 {
        return Err(unsupported("expected a 4-d input"));
    }
    if input.indices[0].as_index() != Some(n.as_str()) {
        return Err(unsupported("batch index must pass through"));
    }
    let channel = input.indices[1]
        .as_index()
        .ok_or_else(|| unsupported("input channel must be a plain index"))?;
    let (stride_h, r_h) = strided(&input.indices[2], h)
        .ok_or_else(|| unsupported("input row must be `h * S + r`"))?;
    let (stride_w, r_w) = strided(&input.indices[3], w)
        .ok_or_else(|| unsupported("input column must be `w * S + r`"))?;
    if stride_h == 0 || stride_w == 0 {
        return Err(unsupported("stride must be positive"));
    }

    if kernel.indices.len() != def.params[1].sizes.len() {
        return Err(unsupported("kernel access rank differs from its declaration"));
    }
    let kernel_indices: Vec<Option<&str>> = kernel.indices.iter().map(Affine::as_index).collect();

    let kind = match kernel_indices.as_slice() {
        [Some(ko), Some(kc), Some(kh), Some(kw)]
            if *ko == o.as_str()
                && *kc == channel
                && !stmt.indices.iter().any(|i| i.as_str() == *kc)
                && *kh == r_h.as_str()
                && *kw == r_w.as_str() =>
        {
            OperatorKind::StandardConv
        }
        [Some(kc), Some(kh), Some(kw)]
            if *kc == channel
                && channel == o.as_str()
                && *kh == r_h.as_str()
                && *kw == r_w.as_str() =>
        {
            OperatorKind::DepthwiseConv
        }
        _ => return Err(unsupported("kernel indexing matches no convolution form")),
    };

    Ok(ConvPlan {
        kind,
        stride: (stride_h, stride_w),
        input: input.tensor.clone(),
        kernel: kernel.tensor.clone(),
    })
}
