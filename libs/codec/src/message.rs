//! # Edge Message
//!
//! The unit that travels over the shared channel: a content type, a map of
//! header id to raw bytes, and an opaque body. The channel stamps its own
//! sequence number on send; edge-level ordering uses [`SEQ_HEADER`] instead.
//!
//! Unrecognized header ids are kept as-is and never cause a decode failure.

use crate::constants::{CONN_ID_HEADER, ERROR_CODE_HEADER, FIN, FLAGS_HEADER, SEQ_HEADER, UUID_HEADER};
use crate::content_type::ContentType;
use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use crate::header::{HeaderType, HeaderValue};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::Span;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    content_type: i32,
    sequence: i32,
    headers: HashMap<i32, Vec<u8>>,
    body: Bytes,
}

impl Message {
    pub fn new(content_type: impl Into<i32>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            sequence: 0,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Message with no body
    pub fn empty(content_type: impl Into<i32>) -> Self {
        Self::new(content_type, Bytes::new())
    }

    pub fn content_type(&self) -> i32 {
        self.content_type
    }

    /// Known content type, `None` for foreign traffic
    pub fn kind(&self) -> Option<ContentType> {
        ContentType::try_from(self.content_type).ok()
    }

    pub fn is(&self, content_type: ContentType) -> bool {
        self.content_type == content_type.value()
    }

    /// Channel-level sequence, assigned by the channel when sent
    pub fn sequence(&self) -> i32 {
        self.sequence
    }

    pub fn set_sequence(&mut self, sequence: i32) {
        self.sequence = sequence;
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn headers(&self) -> &HashMap<i32, Vec<u8>> {
        &self.headers
    }

    pub fn put_header(&mut self, id: i32, value: impl Into<HeaderValue>) {
        self.headers.insert(id, value.into().encode());
    }

    pub fn put_raw_header(&mut self, id: i32, raw: impl Into<Vec<u8>>) {
        self.headers.insert(id, raw.into());
    }

    pub fn raw_header(&self, id: i32) -> Option<&[u8]> {
        self.headers.get(&id).map(Vec::as_slice)
    }

    pub fn has_header(&self, id: i32) -> bool {
        self.headers.contains_key(&id)
    }

    /// Decode a header as `T`.
    ///
    /// `Ok(None)` means the header is absent; a present header with the wrong
    /// width is an error, never a silent zero.
    pub fn get_header<T: HeaderType>(&self, id: i32) -> ProtocolResult<Option<T>> {
        self.headers
            .get(&id)
            .map(|raw| T::decode(id, raw))
            .transpose()
    }

    /// Decode a header the message kind cannot do without
    pub fn require_header<T: HeaderType>(&self, id: i32, context: &str) -> ProtocolResult<T> {
        self.get_header(id)?
            .ok_or_else(|| ProtocolError::missing_header(id, context))
    }

    pub fn conn_id(&self) -> ProtocolResult<Option<u32>> {
        self.get_header(CONN_ID_HEADER)
    }

    /// Per-connection data sequence
    pub fn edge_seq(&self) -> ProtocolResult<Option<u32>> {
        self.get_header(SEQ_HEADER)
    }

    pub fn flags(&self) -> ProtocolResult<u32> {
        Ok(self.get_header(FLAGS_HEADER)?.unwrap_or(0))
    }

    /// Whether this data message closes its direction of the stream
    pub fn is_fin(&self) -> bool {
        self.flags().map(|f| f & FIN != 0).unwrap_or(false)
    }

    pub fn error_code(&self) -> ProtocolResult<Option<ErrorCode>> {
        match self.get_header::<u32>(ERROR_CODE_HEADER)? {
            None => Ok(None),
            Some(code) => ErrorCode::try_from(code).map(Some).map_err(|_| {
                ProtocolError::InvalidHeaderValue {
                    header_id: ERROR_CODE_HEADER,
                    value: u64::from(code),
                    kind: "ErrorCode",
                }
            }),
        }
    }

    /// Message UUID from the reflected header, if one was attached
    pub fn uuid(&self) -> Option<Uuid> {
        self.raw_header(UUID_HEADER)
            .and_then(|raw| Uuid::from_slice(raw).ok())
    }

    pub fn set_uuid(&mut self, id: Uuid) {
        self.put_raw_header(UUID_HEADER, id.as_bytes().to_vec());
    }

    /// Span carrying the fields every edge log line should have
    pub fn span(&self) -> Span {
        let conn_id = self.conn_id().ok().flatten().unwrap_or(0);
        let edge_seq = self.edge_seq().ok().flatten().unwrap_or(0);
        let span = tracing::debug_span!(
            "edge_msg",
            conn_id,
            content_type = %ContentType::describe(self.content_type),
            ch_seq = self.sequence,
            edge_seq,
            uuid = tracing::field::Empty,
        );
        if let Some(id) = self.uuid() {
            span.record("uuid", tracing::field::display(id));
        }
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_versus_zero() {
        let mut msg = Message::empty(ContentType::Probe);
        assert_eq!(msg.get_header::<u32>(CONN_ID_HEADER).unwrap(), None);

        msg.put_header(CONN_ID_HEADER, 0u32);
        assert_eq!(msg.get_header::<u32>(CONN_ID_HEADER).unwrap(), Some(0));
    }

    #[test]
    fn test_unknown_headers_preserved() {
        let mut msg = Message::new(ContentType::Data, b"payload".to_vec());
        msg.put_raw_header(9999, vec![1u8, 2, 3]);

        let copy = msg.clone();
        assert_eq!(copy.raw_header(9999), Some(&[1u8, 2, 3][..]));
        assert_eq!(copy.get_header::<Vec<u8>>(9999).unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_wrong_width_surfaces() {
        let mut msg = Message::empty(ContentType::Data);
        msg.put_raw_header(CONN_ID_HEADER, vec![1u8, 0]);
        assert!(msg.conn_id().is_err());
    }

    #[test]
    fn test_error_code_header() {
        let mut msg = Message::empty(ContentType::DialFailed);
        assert_eq!(msg.error_code().unwrap(), None);

        msg.put_header(ERROR_CODE_HEADER, 6u32);
        assert_eq!(msg.error_code().unwrap(), Some(ErrorCode::InvalidService));

        msg.put_header(ERROR_CODE_HEADER, 99u32);
        assert!(msg.error_code().is_err());
    }

    #[test]
    fn test_uuid_header() {
        let mut msg = Message::empty(ContentType::Dial);
        assert!(msg.uuid().is_none());

        let id = Uuid::new_v4();
        msg.set_uuid(id);
        assert_eq!(msg.uuid(), Some(id));
        let _entered = msg.span().entered();
    }

    #[test]
    fn test_kind() {
        let msg = Message::empty(1234);
        assert_eq!(msg.kind(), None);
        assert!(Message::empty(ContentType::Bind).is(ContentType::Bind));
    }
}
