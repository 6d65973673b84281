use std::borrow::Cow;

use encoding_rs::Encoding;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use percent_encoding::percent_decode_str;

use crate::Error;

/// Parsed headers of one part.
#[derive(Debug, Clone)]
pub struct PartHeaders {
    pub name: String,
    /// Original filename as sent by the client, reduced to its last path component.
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub map: HeaderMap,
}

impl PartHeaders {
    /// Parses a header block (without the terminating blank line).
    ///
    /// A missing Content-Disposition, or one without a `name`, fails the whole
    /// request.
    pub fn parse(block: &[u8]) -> Result<Self, Error> {
        let map = parse_header_block(block)?;

        let disposition = map
            .get(CONTENT_DISPOSITION)
            .ok_or_else(|| Error::malformed("Content-Disposition missing"))?;
        let disposition = std::str::from_utf8(disposition.as_bytes())
            .map_err(|_| Error::malformed("Content-Disposition is not valid UTF-8"))?;

        let params = disposition_params(disposition)?;

        let name = params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("name"))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::malformed("Content-Disposition lacks a name"))?;

        // The RFC 5987 form wins over the plain one when both are sent.
        let extended = params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("filename*"))
            .and_then(|(_, v)| decode_ext_value(v));
        let filename = extended
            .or_else(|| {
                params
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("filename"))
                    .map(|(_, v)| v.clone())
            })
            .map(|f| basename(&f).to_string());

        let content_type = map
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(PartHeaders {
            name,
            filename,
            content_type,
            map,
        })
    }

    /// Whether the part should be streamed to storage.
    ///
    /// An empty filename is what browsers send for an untouched file input, so
    /// it counts as a plain field.
    pub fn is_file(&self) -> bool {
        self.filename.as_ref().map_or(false, |f| !f.is_empty())
    }
}

fn parse_header_block(block: &[u8]) -> Result<HeaderMap, Error> {
    let mut lines: Vec<Vec<u8>> = Vec::new();

    for line in block.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        // obs-fold: a continuation line belongs to the previous header.
        if line[0] == b' ' || line[0] == b'\t' {
            match lines.last_mut() {
                Some(prev) => {
                    prev.push(b' ');
                    prev.extend_from_slice(trim(line));
                    continue;
                }
                None => return Err(Error::malformed("header block starts with a continuation")),
            }
        }

        lines.push(line.to_vec());
    }

    let mut map = HeaderMap::new();
    for line in &lines {
        let (name, value) = parse_header_line(line)?;
        map.append(name, value);
    }

    Ok(map)
}

fn parse_header_line(line: &[u8]) -> Result<(HeaderName, HeaderValue), Error> {
    let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
        Error::malformed(format!(
            "header line without colon: {:?}",
            String::from_utf8_lossy(line)
        ))
    })?;

    let name = HeaderName::from_bytes(trim(&line[..colon]))
        .map_err(|e| Error::malformed(format!("invalid header name: {}", e)))?;
    let value = HeaderValue::from_bytes(trim(&line[colon + 1..]))
        .map_err(|e| Error::malformed(format!("invalid header value: {}", e)))?;

    Ok((name, value))
}

fn trim(mut s: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = s {
        s = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = s {
        s = rest;
    }
    s
}

/// Splits `form-data; name="a"; filename="b"` into its parameters.
fn disposition_params(value: &str) -> Result<Vec<(String, String)>, Error> {
    let mut params = Vec::new();
    let mut chars = value.char_indices().peekable();

    // The disposition type itself.
    while let Some(&(_, c)) = chars.peek() {
        if c == ';' {
            break;
        }
        chars.next();
    }

    loop {
        // Skip the separator and whitespace before the next parameter.
        while let Some(&(_, c)) = chars.peek() {
            if c == ';' || c.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }

        let start = match chars.peek() {
            Some(&(i, _)) => i,
            None => return Ok(params),
        };

        let mut key_end = value.len();
        while let Some(&(i, c)) = chars.peek() {
            if c == '=' || c == ';' {
                key_end = i;
                break;
            }
            chars.next();
        }
        let key = value[start..key_end].trim().to_string();

        match chars.next() {
            Some((_, '=')) => (),
            // A bare token without a value.
            _ => continue,
        }

        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }

        let mut val = String::new();
        if let Some(&(_, '"')) = chars.peek() {
            chars.next();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    // Only `\"` and `\\` are escapes. Other backslashes are kept as sent.
                    '\\' => match chars.peek() {
                        Some(&(_, escaped @ '"')) | Some(&(_, escaped @ '\\')) => {
                            val.push(escaped);
                            chars.next();
                        }
                        _ => val.push('\\'),
                    },
                    '"' => {
                        closed = true;
                        break;
                    }
                    c => val.push(c),
                }
            }
            if !closed {
                return Err(Error::malformed(format!("unterminated quoted value for {}", key)));
            }
        } else {
            while let Some(&(_, c)) = chars.peek() {
                if c == ';' {
                    break;
                }
                val.push(c);
                chars.next();
            }
            val = val.trim_end().to_string();
        }

        params.push((key, val));
    }
}

/// Decodes an RFC 5987 `charset'lang'percent-encoded` value.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = Encoding::for_label(pieces.next()?.as_bytes())?;
    let _lang = pieces.next()?;
    let encoded = pieces.next()?;

    let bytes: Cow<[u8]> = percent_decode_str(encoded).into();
    charset
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .map(Cow::into_owned)
}

fn basename(path: &str) -> &str {
    match path.rfind(|c| c == '/' || c == '\\') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}
