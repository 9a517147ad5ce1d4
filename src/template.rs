use tracing::trace;

use crate::{
    error::{Error, Result},
    layer::OperatorKind,
};

pub const STRIDE_PLACEHOLDER: &str = "<stride>";
pub const ENTRY_POINT: &str = "convolution";

static CONVOLUTION: &str = "
    def convolution(float(N,C,H,W) I, float(M,C,KH,KW) W1) -> (O) {
        O(n, m, h, w) +=!
            I(n, r_c, h * <stride> + r_kh, w * <stride>+ r_kw) * W1(m, r_c, r_kh, r_kw)
    }
";

static DEPTHWISE: &str = "
    def convolution(float(N,C,H,W) I, float(C,KH,KW) K) -> (O) {
        O(n,c,h,w) +=!
            I(n, c, h * <stride> + r_kh, w * <stride> + r_kw) * K(c, r_kh, r_kw)
    }
";

/// Replaces every occurrence of `placeholder` in `kernel` with the decimal
/// form of `value`. Text without the placeholder comes back unchanged.
pub fn change_parameter(kernel: &str, placeholder: &str, value: usize) -> String {
    if placeholder.is_empty() {
        return kernel.to_owned();
    }
    kernel.replace(placeholder, &value.to_string())
}

/// Finds the first `<name>` token left in `text`.
pub fn find_placeholder(text: &str) -> Option<(usize, &str)> {
    let bytes = text.as_bytes();
    for (start, &b) in bytes.iter().enumerate() {
        if b != b'<' {
            continue;
        }
        let name_len = bytes[start + 1..]
            .iter()
            .take_while(|c| c.is_ascii_alphanumeric() || **c == b'_')
            .count();
        let end = start + 1 + name_len;
        if name_len > 0 && bytes.get(end) == Some(&b'>') {
            return Some((start, &text[start..=end]));
        }
    }
    None
}

pub fn check_resolved(text: &str) -> Result<()> {
    match find_placeholder(text) {
        Some((offset, token)) => Err(Error::UnresolvedPlaceholder {
            token: token.to_owned(),
            offset,
        }),
        None => Ok(()),
    }
}

/// A kernel definition with a `<stride>` hole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelTemplate {
    kind: OperatorKind,
    text: String,
}

impl KernelTemplate {
    pub fn new(kind: OperatorKind, text: impl Into<String>) -> KernelTemplate {
        KernelTemplate {
            kind,
            text: text.into(),
        }
    }

    pub fn convolution() -> KernelTemplate {
        KernelTemplate::new(OperatorKind::StandardConv, CONVOLUTION)
    }

    pub fn depthwise() -> KernelTemplate {
        KernelTemplate::new(OperatorKind::DepthwiseConv, DEPTHWISE)
    }

    pub fn for_kind(kind: OperatorKind) -> KernelTemplate {
        match kind {
            OperatorKind::StandardConv => KernelTemplate::convolution(),
            OperatorKind::DepthwiseConv => KernelTemplate::depthwise(),
        }
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn instantiate(&self, stride: usize) -> Result<String> {
        let text = change_parameter(&self.text, STRIDE_PLACEHOLDER, stride);
        check_resolved(&text)?;
        trace!("instantiated {:?} template with stride {}", self.kind, stride);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_every_occurrence() {
        let text = change_parameter("a<stride>b<stride>c", STRIDE_PLACEHOLDER, 2);

        assert_eq!(text, "a2b2c");
    }

    #[test]
    fn no_placeholder_is_identity() {
        let text = "def f(float(N) I) -> (O) { O(n) = I(n) }";

        assert_eq!(change_parameter(text, STRIDE_PLACEHOLDER, 7), text);
    }

    #[test]
    fn idempotent_once_resolved() {
        let once = change_parameter("x<stride>y", STRIDE_PLACEHOLDER, 12);
        let twice = change_parameter(&once, STRIDE_PLACEHOLDER, 12);

        assert_eq!(once, twice);
    }

    #[test]
    fn keeps_original_positions() {
        let text = "...<stride>...<stride>...";
        let result = change_parameter(text, STRIDE_PLACEHOLDER, 2);

        assert!(!result.contains(STRIDE_PLACEHOLDER));
        assert_eq!(result, "...2...2...");
        assert_eq!(result.matches('2').count(), 2);
    }

    #[test]
    fn both_templates_instantiate() {
        for template in [KernelTemplate::convolution(), KernelTemplate::depthwise()] {
            assert_eq!(template.text().matches(STRIDE_PLACEHOLDER).count(), 2);
            let text = template.instantiate(2).unwrap();
            assert!(text.contains("h * 2 + r_kh"));
            assert!(find_placeholder(&text).is_none());
        }
    }

    #[test]
    fn leftover_placeholder_is_rejected() {
        let template = KernelTemplate::new(OperatorKind::StandardConv, "I(h * <stride> + <pad>)");

        match template.instantiate(1) {
            Err(Error::UnresolvedPlaceholder { token, offset }) => {
                assert_eq!(token, "<pad>");
                assert_eq!(offset, 10);
            }
            other => panic!("expected unresolved placeholder, got {:?}", other),
        }
    }

    #[test]
    fn comparison_is_not_a_placeholder() {
        assert!(find_placeholder("a < b > c").is_none());
        assert!(find_placeholder("a <> b").is_none());
    }
}
