use crate::ocr::RecognizedToken;

/// Keeps tokens with non-empty trimmed text and `conf >= threshold`, in their
/// original order. Kept tokens carry the trimmed text. The threshold is used
/// as given, without clamping to 0-100.
pub fn filter_tokens(tokens: Vec<RecognizedToken>, threshold: f32) -> Vec<RecognizedToken> {
    tokens
        .into_iter()
        .filter_map(|mut token| {
            let trimmed = token.text.trim();
            if trimmed.is_empty() || token.conf < threshold {
                return None;
            }
            if trimmed.len() != token.text.len() {
                token.text = trimmed.to_string();
            }
            Some(token)
        })
        .collect()
}
