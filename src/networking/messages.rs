/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The envelope every fast sync message travels in.
//!
//! A frame is a single [`MessageCode`] byte followed by the borsh encoding of the message it
//! identifies:
//!
//! ```text
//! +------+---------------------------+
//! | code |  payload (borsh)          |
//! +------+---------------------------+
//! ```

use std::io;

use borsh::BorshSerialize;
use thiserror::Error;

use crate::trie_sync::messages::{TrieStateRequest, TrieStateResponse};

/// All message variants used in fast sync.
#[derive(Clone, Debug)]
pub enum Message {
    TrieStateRequest(TrieStateRequest),
    TrieStateResponse(TrieStateResponse),
}

impl Message {
    pub fn code(&self) -> MessageCode {
        match self {
            Message::TrieStateRequest(_) => MessageCode::RequestTrieState,
            Message::TrieStateResponse(_) => MessageCode::ResponseTrieState,
        }
    }

    /// Encode this message into a frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = vec![self.code() as u8];
        // Serializing into a Vec<u8> does not fail.
        let _ = match self {
            Message::TrieStateRequest(request) => request.serialize(&mut frame),
            Message::TrieStateResponse(response) => response.serialize(&mut frame),
        };
        frame
    }
}

impl From<TrieStateRequest> for Message {
    fn from(value: TrieStateRequest) -> Self {
        Message::TrieStateRequest(value)
    }
}

impl From<TrieStateResponse> for Message {
    fn from(value: TrieStateResponse) -> Self {
        Message::TrieStateResponse(value)
    }
}

/// Code identifying the kind of message carried in a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageCode {
    RequestTrieState = 0,
    ResponseTrieState = 1,
}

impl TryFrom<u8> for MessageCode {
    type Error = DecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MessageCode::RequestTrieState),
            1 => Ok(MessageCode::ResponseTrieState),
            other => Err(DecodeError::UnknownMessageCode(other)),
        }
    }
}

/// Split a frame into its message code and payload.
pub fn split_frame(frame: &[u8]) -> Result<(MessageCode, &[u8]), DecodeError> {
    let (code, payload) = frame.split_first().ok_or(DecodeError::EmptyMessage)?;
    Ok((MessageCode::try_from(*code)?, payload))
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty message")]
    EmptyMessage,
    #[error("unknown message code {0}")]
    UnknownMessageCode(u8),
    #[error("malformed payload: {0}")]
    Malformed(#[from] io::Error),
    #[error("batch of {count} referenced nodes exceeds the maximum of {max}")]
    BatchTooLarge { count: usize, max: u32 },
}
