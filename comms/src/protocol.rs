//! Message kind headers, written right after the length prefix of every frame.

pub(crate) type HeaderType = u32;
pub(crate) const HEADER_SIZE: usize = size_of::<HeaderType>();

pub(crate) const ERR: HeaderType = 0;
pub(crate) const CONTROL: HeaderType = 1;
pub(crate) const PARAMS: HeaderType = 2;
pub(crate) const FIELD: HeaderType = 3;

/// Human readable name of a header value, used in protocol diagnostics.
pub(crate) fn kind_name(kind: HeaderType) -> &'static str {
    match kind {
        ERR => "err",
        CONTROL => "control",
        PARAMS => "data/params",
        FIELD => "data/field",
        _ => "unknown",
    }
}
