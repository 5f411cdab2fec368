//! Markdown code-fence stripping.
//!
//! Models tend to wrap generated source in a fenced block even when told not
//! to. [`strip_code_fences`] pulls the source back out. It is re-run over the
//! whole accumulated buffer on every streamed chunk, so it must stay a pure
//! function of its input.

use std::sync::LazyLock;

use regex::Regex;

/// Language tags recognised after an opening fence. Longer tags come first
/// so that `tsx` is not read as `ts` followed by a stray `x`.
const FENCE_LANGUAGES: &[&str] = &["typescript", "javascript", "tsx", "jsx", "ts", "js"];

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?s)```(?:{})?\r?\n(.*?)```",
        FENCE_LANGUAGES.join("|")
    );
    Regex::new(&pattern).expect("fence pattern is valid")
});

/// Return the trimmed body of the first complete fenced block in `text`, or
/// `text` trimmed when there is none.
///
/// An opening fence without its closing marker counts as "no fence", which
/// keeps partially streamed output visible.
pub fn strip_code_fences(text: &str) -> String {
    match FENCE_RE.captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_owned(),
        None => text.trim().to_owned(),
    }
}
