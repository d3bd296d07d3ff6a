use std::collections::HashSet;

/// Maximum token length to store in the index.
/// Tokens longer than this are likely base64, hex dumps, or other non-searchable content.
const MAX_TOKEN_LENGTH: usize = 128;

/// Extract tokens from document text.
/// Handles: words, snake_case splits, camelCase splits. Every token is lowercased,
/// and a camelCase word is indexed both whole and as its parts.
pub fn extract_tokens(content: &str) -> HashSet<String> {
    let mut tokens = HashSet::with_capacity(content.len() / 6 + 1);
    let mut word = String::new();
    let mut part = String::new();
    let mut prev_char_type = CharType::Other;

    for ch in content.chars() {
        let char_type = classify_char(ch);

        match char_type {
            CharType::Lower | CharType::Digit => {
                word.push(ch);
                part.push(ch);
            }
            CharType::Upper => {
                // CamelCase split: uppercase after lowercase
                if prev_char_type == CharType::Lower && !part.is_empty() {
                    add_token(&mut tokens, &part);
                    part.clear();
                }
                word.push(ch);
                part.push(ch);
            }
            CharType::Underscore | CharType::Other => {
                if part.len() < word.len() {
                    add_token(&mut tokens, &part);
                }
                add_token(&mut tokens, &word);
                word.clear();
                part.clear();
            }
        }

        prev_char_type = char_type;
    }

    if part.len() < word.len() {
        add_token(&mut tokens, &part);
    }
    add_token(&mut tokens, &word);

    tokens
}

/// Extract tokens suitable for query matching, in a stable order
pub fn tokenize_query(query: &str) -> Vec<String> {
    let tokens = extract_tokens(query);
    let mut result: Vec<_> = tokens.into_iter().collect();
    result.sort();
    result
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CharType {
    Upper,
    Lower,
    Digit,
    Underscore,
    Other,
}

fn classify_char(ch: char) -> CharType {
    if ch.is_uppercase() {
        CharType::Upper
    } else if ch.is_alphabetic() {
        CharType::Lower
    } else if ch.is_numeric() {
        CharType::Digit
    } else if ch == '_' {
        CharType::Underscore
    } else {
        CharType::Other
    }
}

fn add_token(tokens: &mut HashSet<String>, token: &str) {
    // Skip empty and overly long tokens
    if !token.is_empty() && token.chars().count() <= MAX_TOKEN_LENGTH {
        tokens.insert(token.to_lowercase());
    }
}
