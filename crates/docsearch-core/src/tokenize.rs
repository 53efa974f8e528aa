//! Keyword tokenizer.
//!
//! A token is a maximal run of alphanumeric characters, lowercased with
//! Unicode rules. Apostrophes inside a word are dropped (`client's` →
//! `clients`); every other non-alphanumeric character separates tokens.
//! No stemming and no stop-word removal: the same function runs at index
//! and query time, so both sides always agree.

/// Split `text` into lowercase terms, in order of appearance.
///
/// ```rust
/// use docsearch_core::tokenize::tokenize;
///
/// assert_eq!(tokenize("Invoice #42: PAID."), vec!["invoice", "42", "paid"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if is_apostrophe(c)
            && !current.is_empty()
            && chars.peek().is_some_and(|n| n.is_alphanumeric())
        {
            continue;
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_apostrophe(c: char) -> bool {
    c == '\'' || c == '\u{2019}'
}
