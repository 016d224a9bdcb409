use std::ffi::OsStr;

use mime::Mime;

/// maps the extensions the asset directory is expected to carry.
/// anything unrecognized is served as a plain byte stream
pub fn mime_from_ext(ext: Option<&OsStr>) -> Mime {
    let Some(ext) = ext.and_then(OsStr::to_str) else {
        return mime::APPLICATION_OCTET_STREAM;
    };

    match ext {
        "css" => mime::TEXT_CSS,
        "js" => mime::APPLICATION_JAVASCRIPT,
        "png" => mime::IMAGE_PNG,
        "svg" => mime::IMAGE_SVG,
        "ico" => "image/x-icon".parse().unwrap(),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_and_unknown_extensions() {
        assert_eq!(mime_from_ext(Some(OsStr::new("css"))), mime::TEXT_CSS);
        assert_eq!(mime_from_ext(Some(OsStr::new("bin"))), mime::APPLICATION_OCTET_STREAM);
        assert_eq!(mime_from_ext(None), mime::APPLICATION_OCTET_STREAM);
    }
}
