//! Decimal formats and the `format-number` picture interpreter.

use xylem_xpath::{Error, Result};

/// The characters and symbols of one `xsl:decimal-format`.
#[derive(Debug, Clone)]
pub struct DecimalFormat {
    /// Separates the integer and fraction parts.
    pub decimal_separator: char,
    /// Separates digit groups.
    pub grouping_separator: char,
    /// Prefixed to negative numbers by the default negative pattern.
    pub minus_sign: char,
    /// Multiplies by 100 and appends.
    pub percent: char,
    /// Multiplies by 1000 and appends.
    pub per_mille: char,
    /// The digit representing zero; digits count up from it.
    pub zero_digit: char,
    /// The optional-digit placeholder.
    pub digit: char,
    /// Separates the positive and negative subpictures.
    pub pattern_separator: char,
    /// Rendering of infinite values.
    pub infinity: String,
    /// Rendering of NaN.
    pub nan: String,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            minus_sign: '-',
            percent: '%',
            per_mille: '\u{2030}',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
            infinity: "Infinity".to_string(),
            nan: "NaN".to_string(),
        }
    }
}

struct SubPicture {
    prefix: String,
    suffix: String,
    min_integer: usize,
    min_fraction: usize,
    max_fraction: usize,
    group_size: Option<usize>,
    multiplier: f64,
}

impl DecimalFormat {
    /// Format a double against a picture string.
    pub fn format(&self, value: f64, picture: &str) -> Result<String> {
        if value.is_nan() {
            return Ok(self.nan.clone());
        }
        let (positive, negative) = self.split_picture(picture)?;
        let positive = self.parse_subpicture(&positive)?;
        let negative = match negative {
            Some(negative) => self.parse_subpicture(&negative)?,
            None => SubPicture {
                prefix: format!("{}{}", self.minus_sign, positive.prefix),
                suffix: positive.suffix.clone(),
                ..copy_numeric(&positive)
            },
        };
        let subpicture = if value.is_sign_negative() && value != 0.0 {
            &negative
        } else {
            &positive
        };
        if value.is_infinite() {
            return Ok(format!(
                "{}{}{}",
                subpicture.prefix, self.infinity, subpicture.suffix
            ));
        }
        let scaled = value.abs() * subpicture.multiplier;
        let rounded = round_to(scaled, subpicture.max_fraction);
        let mut integer_part = format!("{:.0}", rounded.trunc());
        while integer_part.len() < subpicture.min_integer {
            integer_part.insert(0, '0');
        }
        // digits map through the zero-digit
        let mut digits: String = integer_part
            .chars()
            .map(|c| self.map_digit(c))
            .collect();
        if let Some(size) = subpicture.group_size {
            digits = self.group(&digits, size);
        }
        let mut out = String::new();
        out.push_str(&subpicture.prefix);
        out.push_str(&digits);
        let fraction = fraction_digits(rounded, subpicture.max_fraction, subpicture.min_fraction);
        if !fraction.is_empty() {
            out.push(self.decimal_separator);
            for c in fraction.chars() {
                out.push(self.map_digit(c));
            }
        }
        out.push_str(&subpicture.suffix);
        Ok(out)
    }

    fn map_digit(&self, c: char) -> char {
        if let Some(offset) = c.to_digit(10) {
            char::from_u32(self.zero_digit as u32 + offset).unwrap_or(c)
        } else {
            c
        }
    }

    fn group(&self, digits: &str, size: usize) -> String {
        if size == 0 {
            return digits.to_string();
        }
        let chars: Vec<char> = digits.chars().collect();
        let mut out = String::new();
        for (i, c) in chars.iter().enumerate() {
            if i > 0 && (chars.len() - i) % size == 0 {
                out.push(self.grouping_separator);
            }
            out.push(*c);
        }
        out
    }

    fn split_picture(&self, picture: &str) -> Result<(String, Option<String>)> {
        let mut parts = picture.split(self.pattern_separator);
        let positive = parts.next().ok_or(Error::FODF1310)?.to_string();
        let negative = parts.next().map(|s| s.to_string());
        if parts.next().is_some() || positive.is_empty() {
            return Err(Error::FODF1310);
        }
        Ok((positive, negative))
    }

    fn parse_subpicture(&self, picture: &str) -> Result<SubPicture> {
        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut min_integer = 0usize;
        let mut min_fraction = 0usize;
        let mut max_fraction = 0usize;
        let mut multiplier = 1.0;
        let mut group_positions: Vec<usize> = Vec::new();
        let mut integer_digits = 0usize;
        let mut seen_digit = false;
        let mut in_fraction = false;
        let mut done_numeric = false;
        for c in picture.chars() {
            if c == self.digit || (c.is_ascii_digit() && c >= self.zero_digit) || c == self.zero_digit {
                if done_numeric {
                    return Err(Error::FODF1310);
                }
                seen_digit = true;
                if in_fraction {
                    max_fraction += 1;
                    if c == self.zero_digit {
                        min_fraction = max_fraction;
                    }
                } else {
                    integer_digits += 1;
                    if c == self.zero_digit {
                        min_integer += 1;
                    }
                }
            } else if c == self.decimal_separator {
                if in_fraction {
                    return Err(Error::FODF1310);
                }
                in_fraction = true;
            } else if c == self.grouping_separator {
                if !in_fraction {
                    group_positions.push(integer_digits);
                }
            } else if c == self.percent {
                multiplier = 100.0;
                if seen_digit {
                    suffix.push(c);
                } else {
                    prefix.push(c);
                }
            } else if c == self.per_mille {
                multiplier = 1000.0;
                if seen_digit {
                    suffix.push(c);
                } else {
                    prefix.push(c);
                }
            } else if seen_digit {
                done_numeric = true;
                suffix.push(c);
            } else {
                prefix.push(c);
            }
        }
        if !seen_digit {
            return Err(Error::FODF1310);
        }
        // the group size is the digit distance from the last separator
        // to the decimal point
        let group_size = group_positions
            .last()
            .map(|position| integer_digits - position)
            .filter(|size| *size > 0);
        Ok(SubPicture {
            prefix,
            suffix,
            min_integer: min_integer.max(1),
            min_fraction,
            max_fraction,
            group_size,
            multiplier,
        })
    }
}

fn copy_numeric(source: &SubPicture) -> SubPicture {
    SubPicture {
        prefix: String::new(),
        suffix: String::new(),
        min_integer: source.min_integer,
        min_fraction: source.min_fraction,
        max_fraction: source.max_fraction,
        group_size: source.group_size,
        multiplier: source.multiplier,
    }
}

fn round_to(value: f64, places: usize) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

fn fraction_digits(value: f64, max: usize, min: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let formatted = format!("{:.*}", max, value.fract());
    let digits = formatted.split('.').nth(1).unwrap_or("");
    let mut trimmed: String = digits.trim_end_matches('0').to_string();
    while trimmed.len() < min {
        trimmed.push('0');
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_grouped() {
        let format = DecimalFormat::default();
        assert_eq!(format.format(12345.678, "#,##0.00").unwrap(), "12,345.68");
        assert_eq!(format.format(0.5, "0.0").unwrap(), "0.5");
        assert_eq!(format.format(7.0, "000").unwrap(), "007");
        assert_eq!(format.format(-3.0, "0").unwrap(), "-3");
    }

    #[test]
    fn percent_and_subpictures() {
        let format = DecimalFormat::default();
        assert_eq!(format.format(0.25, "0%").unwrap(), "25%");
        assert_eq!(format.format(-2.0, "0.0;(0.0)").unwrap(), "(2.0)");
    }

    #[test]
    fn special_values() {
        let format = DecimalFormat::default();
        assert_eq!(format.format(f64::NAN, "0").unwrap(), "NaN");
        assert_eq!(format.format(f64::INFINITY, "0").unwrap(), "Infinity");
    }

    #[test]
    fn bad_picture() {
        let format = DecimalFormat::default();
        assert!(format.format(1.0, "").is_err());
        assert!(format.format(1.0, "abc").is_err());
    }
}
