//! aPaaS OpenAPI service implementations.

mod automation;
mod departments;
mod functions;
mod global;
mod objects;
mod pages;

pub use automation::*;
pub use departments::*;
pub use functions::*;
pub use global::*;
pub use objects::*;
pub use pages::*;

use crate::errors::{ApaasError, ApaasResult};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left as-is inside a single path segment.
const PATH_SEGMENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes one path segment; `/` is encoded too.
pub(crate) fn escape_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT_SET).to_string()
}

/// Validates that `value` is not blank and returns it escaped for use in a path.
pub(crate) fn path_segment(field: &str, value: &str) -> ApaasResult<String> {
    if value.trim().is_empty() {
        return Err(ApaasError::validation(field, "must not be empty"));
    }
    Ok(escape_segment(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_segment() {
        assert_eq!(escape_segment("object_1"), "object_1");
        assert_eq!(escape_segment("a/b c"), "a%2Fb%20c");
        assert_eq!(escape_segment("名称"), "%E5%90%8D%E7%A7%B0");
    }

    #[test]
    fn test_blank_segment_rejected() {
        let err = path_segment("object_name", "  ").unwrap_err();
        assert!(matches!(err, ApaasError::Validation(ref v) if v.field == "object_name"));
        assert_eq!(path_segment("record_id", "42").unwrap(), "42");
    }
}
