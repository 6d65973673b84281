use crate::Error;

/// RFC 2046 caps boundaries at 70 characters.
pub const MAX_BOUNDARY_LEN: usize = 70;

/// A header source, implemented for http::HeaderMap.
/// If library is to be used for actix, it must be implemented
/// for actix_web::HeaderMap
pub trait HeaderMap {
    fn get_value<K>(&self, header_key: K) -> Option<&str>
    where
        K: AsRef<str>;
}

impl HeaderMap for http::header::HeaderMap {
    fn get_value<K>(&self, header_key: K) -> Option<&str>
    where
        K: AsRef<str>,
    {
        self.get(header_key.as_ref())
            .and_then(|hv| hv.to_str().ok())
    }
}

/// Reads the multipart boundary out of the Content-Type of `headers`.
pub fn boundary(headers: &impl HeaderMap) -> Result<String, Error> {
    let content_type = headers
        .get_value("content-type")
        .ok_or(Error::ContentTypeMissing)?;

    let mime_type = content_type
        .parse::<mime::Mime>()
        .map_err(Error::InvalidMimeType)?;

    if mime_type.type_() != mime::MULTIPART {
        return Err(Error::NotMultipart);
    }

    match mime_type.get_param(mime::BOUNDARY) {
        Some(boundary) => {
            let boundary = boundary.as_str();
            validate_boundary(boundary)?;
            Ok(boundary.to_string())
        }

        None => Err(Error::BoundaryMissing),
    }
}

pub(crate) fn validate_boundary(boundary: &str) -> Result<(), Error> {
    if boundary.is_empty() {
        return Err(Error::InvalidBoundary("boundary is empty".into()));
    }

    if boundary.len() > MAX_BOUNDARY_LEN {
        return Err(Error::InvalidBoundary(format!(
            "boundary is {} bytes, at most {} allowed",
            boundary.len(),
            MAX_BOUNDARY_LEN
        )));
    }

    if boundary.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(Error::InvalidBoundary("boundary contains a line break".into()));
    }

    Ok(())
}
