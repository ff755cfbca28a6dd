//! Wire and persistence codec.
//!
//! Every gossiped or persisted type travels as a tagged, length-prefixed
//! frame over its SBOR encoding:
//!
//! ```text
//! [tag: u8][len: u32 BE][payload: SBOR]
//! ```
//!
//! The tag names a registered concrete type; a frame with an unknown tag, a
//! tag other than the requested type, or a length that disagrees with the
//! frame fails decoding. For every registered type, `decode(encode(x)) == x`.

use crate::error::CodecError;
use crate::execution::{
    FnExecutionRequest, FnExecutionResponse, FnIndividualExecutionResponse, FnVotePayload,
};
use crate::reactor_state::ReactorStateRecord;
use crate::vote_set::FnVoteSet;
use sbor::prelude::*;

/// Bytes of framing overhead: one tag byte plus a u32 length prefix.
const FRAME_HEADER_LEN: usize = 5;

/// Registered concrete types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireTag {
    ExecutionRequest = 0x01,
    IndividualExecutionResponse = 0x02,
    ExecutionResponse = 0x03,
    VotePayload = 0x04,
    VoteSet = 0x05,
    ReactorState = 0x06,
}

impl WireTag {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::ExecutionRequest),
            0x02 => Some(Self::IndividualExecutionResponse),
            0x03 => Some(Self::ExecutionResponse),
            0x04 => Some(Self::VotePayload),
            0x05 => Some(Self::VoteSet),
            0x06 => Some(Self::ReactorState),
            _ => None,
        }
    }
}

/// A type registered with the codec.
pub trait WireType: BasicEncode + BasicDecode {
    const TAG: WireTag;
}

impl WireType for FnExecutionRequest {
    const TAG: WireTag = WireTag::ExecutionRequest;
}
impl WireType for FnIndividualExecutionResponse {
    const TAG: WireTag = WireTag::IndividualExecutionResponse;
}
impl WireType for FnExecutionResponse {
    const TAG: WireTag = WireTag::ExecutionResponse;
}
impl WireType for FnVotePayload {
    const TAG: WireTag = WireTag::VotePayload;
}
impl WireType for FnVoteSet {
    const TAG: WireTag = WireTag::VoteSet;
}
impl WireType for ReactorStateRecord {
    const TAG: WireTag = WireTag::ReactorState;
}

/// Encode `value` as a tagged, length-prefixed frame.
pub fn encode<T: WireType>(value: &T) -> Result<Vec<u8>, CodecError> {
    let payload = sbor::basic_encode(value).map_err(|e| CodecError::Encode(format!("{e:?}")))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.push(T::TAG as u8);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a frame carrying a `T`.
pub fn decode<T: WireType>(bytes: &[u8]) -> Result<T, CodecError> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(CodecError::TooShort);
    }

    let tag = WireTag::from_byte(bytes[0]).ok_or(CodecError::UnknownTag(bytes[0]))?;
    if tag != T::TAG {
        return Err(CodecError::TagMismatch {
            expected: T::TAG as u8,
            actual: bytes[0],
        });
    }

    let declared = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let payload = &bytes[FRAME_HEADER_LEN..];
    if payload.len() != declared {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }

    sbor::basic_decode(payload).map_err(|e| CodecError::Decode(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::validator::{Validator, ValidatorSet};

    fn make_individual() -> FnIndividualExecutionResponse {
        FnIndividualExecutionResponse {
            status: 7,
            error: "late".to_string(),
            hash: vec![3; 64],
            oracle_signature: vec![4; 16],
        }
    }

    fn make_vote_set() -> FnVoteSet {
        let pair = KeyPair::from_seed([1; 32]);
        let snapshot = ValidatorSet::new(
            vec![Validator {
                address: pair.public_key().address(),
                pub_key: pair.public_key(),
                voting_power: 3,
            }],
            0,
        );
        let individual = FnIndividualExecutionResponse {
            status: 0,
            error: String::new(),
            hash: vec![1; 64],
            oracle_signature: vec![2; 8],
        };
        let payload = FnVotePayload::new(
            FnExecutionRequest::new("price-feed"),
            FnExecutionResponse::from_individual(&individual, 0, 1),
        );
        FnVoteSet::new("test-chain", 0, b"ctx".to_vec(), payload, &pair, &snapshot).unwrap()
    }

    #[test]
    fn test_round_trip_request() {
        let request = FnExecutionRequest::new("price-feed");
        let decoded: FnExecutionRequest = decode(&encode(&request).unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_round_trip_individual_response() {
        let individual = make_individual();
        let decoded: FnIndividualExecutionResponse =
            decode(&encode(&individual).unwrap()).unwrap();
        assert_eq!(decoded, individual);
    }

    #[test]
    fn test_round_trip_payload() {
        let payload = FnVotePayload::new(
            FnExecutionRequest::new("price-feed"),
            FnExecutionResponse::from_individual(&make_individual(), 1, 4),
        );
        let decoded: FnVotePayload = decode(&encode(&payload).unwrap()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_round_trip_vote_set() {
        let vote_set = make_vote_set();
        let decoded: FnVoteSet = decode(&encode(&vote_set).unwrap()).unwrap();
        assert_eq!(decoded, vote_set);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut frame = encode(&FnExecutionRequest::new("price-feed")).unwrap();
        frame[0] = 0x7f;
        let result: Result<FnExecutionRequest, _> = decode(&frame);
        assert_eq!(result.unwrap_err(), CodecError::UnknownTag(0x7f));
    }

    #[test]
    fn test_tag_mismatch_is_rejected() {
        let frame = encode(&FnExecutionRequest::new("price-feed")).unwrap();
        let result: Result<FnVoteSet, _> = decode(&frame);
        assert!(matches!(
            result.unwrap_err(),
            CodecError::TagMismatch { .. }
        ));
    }

    #[test]
    fn test_truncated_frames_are_rejected() {
        let frame = encode(&FnExecutionRequest::new("price-feed")).unwrap();

        let result: Result<FnExecutionRequest, _> = decode(&frame[..3]);
        assert_eq!(result.unwrap_err(), CodecError::TooShort);

        let result: Result<FnExecutionRequest, _> = decode(&frame[..frame.len() - 1]);
        assert!(matches!(
            result.unwrap_err(),
            CodecError::LengthMismatch { .. }
        ));
    }

    #[test]
    fn test_garbage_payload_is_rejected() {
        let mut frame = vec![WireTag::VoteSet as u8];
        frame.extend_from_slice(&4u32.to_be_bytes());
        frame.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let result: Result<FnVoteSet, _> = decode(&frame);
        assert!(matches!(result.unwrap_err(), CodecError::Decode(_)));
    }
}
