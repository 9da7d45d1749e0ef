/// Basic content sanitization: remove script/iframe blocks outright, then
/// HTML-encode any remaining angle brackets. Runs on every user-authored
/// message, DM, post, and comment before it is persisted.
pub fn sanitize_text(input: &str) -> String {
    let stripped = strip_tag_blocks(input, "script");
    let stripped = strip_tag_blocks(&stripped, "iframe");
    stripped.replace('<', "&lt;").replace('>', "&gt;")
}

/// Remove `<tag ...> ... </tag>` blocks, case-insensitive. An unclosed
/// opening tag swallows the rest of the string rather than leaking a
/// half-open payload through the encoder.
fn strip_tag_blocks(input: &str, tag: &str) -> String {
    let lower = input.to_lowercase();
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let mut out = String::with_capacity(input.len());
    let mut pos = 0;

    while let Some(start) = lower[pos..].find(&open) {
        let start = pos + start;
        out.push_str(&input[pos..start]);

        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return out,
        }
    }

    out.push_str(&input[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_blocks_are_removed() {
        assert_eq!(
            sanitize_text("hi <script>alert('x')</script>there"),
            "hi there"
        );
    }

    #[test]
    fn iframe_blocks_are_removed() {
        assert_eq!(
            sanitize_text("<iframe src=\"evil\"></iframe>clean"),
            "clean"
        );
    }

    #[test]
    fn mixed_case_tags_are_caught() {
        assert_eq!(sanitize_text("<ScRiPt>x</sCrIpT>ok"), "ok");
    }

    #[test]
    fn unclosed_script_does_not_leak() {
        assert_eq!(sanitize_text("before<script>payload"), "before");
    }

    #[test]
    fn remaining_angle_brackets_are_encoded() {
        assert_eq!(sanitize_text("a < b > c"), "a &lt; b &gt; c");
        assert_eq!(sanitize_text("<b>bold</b>"), "&lt;b&gt;bold&lt;/b&gt;");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(sanitize_text("meet at the library at 5"), "meet at the library at 5");
    }
}
