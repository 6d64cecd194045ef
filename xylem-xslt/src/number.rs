//! `xsl:number` value formatting.
//!
//! A format picture alternates separator runs and format tokens; each
//! counted value consumes one token (the last token repeats).

/// Format a list of counted values against a picture like `1.1.a`.
pub fn format_values(values: &[usize], picture: &str) -> String {
    let (tokens, separators, leading, trailing) = tokenize(picture);
    if tokens.is_empty() {
        return values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(".");
    }
    let mut out = String::new();
    out.push_str(&leading);
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            let separator = separators
                .get(i - 1)
                .or(separators.last())
                .map(|s| s.as_str())
                .unwrap_or(".");
            out.push_str(separator);
        }
        let token = tokens.get(i).or(tokens.last()).unwrap();
        out.push_str(&format_one(*value, token));
    }
    out.push_str(&trailing);
    out
}

// returns (tokens, separators-between-tokens, leading, trailing)
fn tokenize(picture: &str) -> (Vec<String>, Vec<String>, String, String) {
    let mut tokens = Vec::new();
    let mut separators = Vec::new();
    let mut leading = String::new();
    let mut trailing = String::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut pending_separator = String::new();
    for c in picture.chars() {
        if c.is_alphanumeric() {
            if !in_token {
                if tokens.is_empty() {
                    leading = std::mem::take(&mut pending_separator);
                } else {
                    separators.push(std::mem::take(&mut pending_separator));
                }
                in_token = true;
            }
            current.push(c);
        } else {
            if in_token {
                tokens.push(std::mem::take(&mut current));
                in_token = false;
            }
            pending_separator.push(c);
        }
    }
    if in_token {
        tokens.push(current);
    } else {
        trailing = pending_separator.clone();
        pending_separator.clear();
    }
    if !pending_separator.is_empty() {
        trailing = pending_separator;
    }
    (tokens, separators, leading, trailing)
}

fn format_one(value: usize, token: &str) -> String {
    match token {
        "a" => alphabetic(value, false),
        "A" => alphabetic(value, true),
        "i" => roman(value, false),
        "I" => roman(value, true),
        _ if token.chars().all(|c| c.is_ascii_digit()) => {
            // the token width sets zero padding
            format!("{:0width$}", value, width = token.len())
        }
        _ => value.to_string(),
    }
}

fn alphabetic(value: usize, upper: bool) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let base = if upper { b'A' } else { b'a' };
    let mut value = value;
    let mut out = Vec::new();
    while value > 0 {
        value -= 1;
        out.push(base + (value % 26) as u8);
        value /= 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

fn roman(value: usize, upper: bool) -> String {
    if value == 0 || value > 4999 {
        return value.to_string();
    }
    const NUMERALS: &[(usize, &str)] = &[
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut out = String::new();
    let mut value = value;
    for (magnitude, numeral) in NUMERALS {
        while value >= *magnitude {
            out.push_str(numeral);
            value -= magnitude;
        }
    }
    if upper {
        out.to_uppercase()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_tokens() {
        assert_eq!(format_values(&[3], "1"), "3");
        assert_eq!(format_values(&[3], "01"), "03");
        assert_eq!(format_values(&[2, 7], "1.1"), "2.7");
        assert_eq!(format_values(&[1, 2, 3], "1.1"), "1.2.3");
    }

    #[test]
    fn alphabetic_and_roman() {
        assert_eq!(format_values(&[1], "a"), "a");
        assert_eq!(format_values(&[27], "a"), "aa");
        assert_eq!(format_values(&[4], "i"), "iv");
        assert_eq!(format_values(&[1944], "I"), "MCMXLIV");
    }

    #[test]
    fn punctuation_carries_through() {
        assert_eq!(format_values(&[2], "(1)"), "(2)");
        assert_eq!(format_values(&[1, 2], "1-1."), "1-2.");
    }
}
