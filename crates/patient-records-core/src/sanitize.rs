//! Markup neutralisation for free-text fields.
//!
//! Text is HTML-escaped rather than stripped, so the literal content survives
//! and nothing a clinician typed is silently dropped. Apostrophes are left
//! alone because they are legal in names (`O'Brien`).

/// Entities produced by [`escape_markup`]. An `&` that already starts one of
/// these is kept as-is, which makes escaping idempotent.
const KNOWN_ENTITIES: &[&str] = &["&amp;", "&lt;", "&gt;", "&quot;", "&#39;"];

/// Escape `&`, `<`, `>` and `"`.
///
/// Running it twice yields the same string as running it once, so records can
/// be re-sanitized on every update without double escaping.
pub fn escape_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    for (i, ch) in input.char_indices() {
        match ch {
            '&' => {
                let rest = &input[i..];
                if KNOWN_ENTITIES.iter().any(|e| rest.starts_with(e)) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }

    out
}

/// True if the text still contains a raw tag opener.
pub fn contains_markup(input: &str) -> bool {
    input.contains('<') || input.contains('>')
}

/// Inverse of [`escape_markup`]: decode the entities it produces.
///
/// Single pass, so `&amp;lt;` decodes to `&lt;` and not to `<`. Search and
/// length checks run on this form so they see the text as it was typed.
pub fn decode_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match KNOWN_ENTITIES.iter().position(|e| rest.starts_with(e)) {
            Some(i) => {
                out.push(DECODED[i]);
                rest = &rest[KNOWN_ENTITIES[i].len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Characters for each entry of [`KNOWN_ENTITIES`], in the same order.
const DECODED: [char; 5] = ['&', '<', '>', '"', '\''];
