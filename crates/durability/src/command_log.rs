//! Command log entries
//!
//! Each buffered [`MutationCommand`] is logged as one frame whose body is
//! the bincode encoding of a `LoggedCommand`. Only the entity type and
//! index name are logged for the target index; on replay the caller's
//! [`IndexResolver`] turns them back into an [`IndexIdentifier`] against
//! the current index metadata.
//!
//! [`IndexIdentifier`]: kvindex_core::IndexIdentifier

use crate::encoding::{decode_frame, encode_frame, FrameRead};
use kvindex_core::{
    EntityType, Error, IndexConfig, IndexResolver, MutationCommand, Result,
};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
enum LoggedCommand {
    AddEntry {
        entity_type: EntityType,
        index_name: String,
        key: String,
        value: String,
        entity_id: u64,
    },
    RemoveEntry {
        entity_type: EntityType,
        index_name: String,
        key: String,
        value: String,
        entity_id: u64,
    },
    CreateIndex {
        entity_type: EntityType,
        index_name: String,
        config: IndexConfig,
    },
}

impl From<&MutationCommand> for LoggedCommand {
    fn from(cmd: &MutationCommand) -> Self {
        match cmd {
            MutationCommand::AddEntry {
                identifier,
                key,
                value,
                entity_id,
            } => LoggedCommand::AddEntry {
                entity_type: identifier.entity_type,
                index_name: identifier.index_name.clone(),
                key: key.clone(),
                value: value.clone(),
                entity_id: *entity_id,
            },
            MutationCommand::RemoveEntry {
                identifier,
                key,
                value,
                entity_id,
            } => LoggedCommand::RemoveEntry {
                entity_type: identifier.entity_type,
                index_name: identifier.index_name.clone(),
                key: key.clone(),
                value: value.clone(),
                entity_id: *entity_id,
            },
            MutationCommand::CreateIndex { identifier, config } => LoggedCommand::CreateIndex {
                entity_type: identifier.entity_type,
                index_name: identifier.index_name.clone(),
                config: config.clone(),
            },
        }
    }
}

impl LoggedCommand {
    fn into_command(self, resolver: &dyn IndexResolver) -> MutationCommand {
        match self {
            LoggedCommand::AddEntry {
                entity_type,
                index_name,
                key,
                value,
                entity_id,
            } => MutationCommand::AddEntry {
                identifier: resolver.resolve(entity_type, &index_name),
                key,
                value,
                entity_id,
            },
            LoggedCommand::RemoveEntry {
                entity_type,
                index_name,
                key,
                value,
                entity_id,
            } => MutationCommand::RemoveEntry {
                identifier: resolver.resolve(entity_type, &index_name),
                key,
                value,
                entity_id,
            },
            LoggedCommand::CreateIndex {
                entity_type,
                index_name,
                config,
            } => MutationCommand::CreateIndex {
                identifier: resolver.resolve(entity_type, &index_name),
                config,
            },
        }
    }
}

/// Append one command to the log, returning the bytes written
pub fn write_command<W: Write>(out: &mut W, cmd: &MutationCommand) -> Result<usize> {
    let body = bincode::serialize(&LoggedCommand::from(cmd))
        .map_err(|e| Error::Serialization(e.to_string()))?;
    encode_frame(out, &body)
}

/// Read the next command from the log
///
/// Returns `Ok(None)` at the end of the log. A torn final frame also ends
/// the log: it was never acknowledged to the host, so it is dropped with a
/// warning. A checksum mismatch is [`Error::Corruption`].
pub fn read_command<R: Read>(
    input: &mut R,
    buffer: &mut Vec<u8>,
    resolver: &dyn IndexResolver,
) -> Result<Option<MutationCommand>> {
    match decode_frame(input, buffer)? {
        FrameRead::End => Ok(None),
        FrameRead::Torn => {
            warn!("command log ends in a torn frame; ignoring it");
            Ok(None)
        }
        FrameRead::Frame => {
            let logged: LoggedCommand = bincode::deserialize(buffer)
                .map_err(|e| Error::Corruption(format!("undecodable command: {}", e)))?;
            Ok(Some(logged.into_command(resolver)))
        }
    }
}

/// Sequential reader over a command log stream
///
/// Keeps one buffer for the whole replay.
pub struct CommandLogReader<R> {
    input: R,
    buffer: Vec<u8>,
    commands_read: u64,
}

impl<R: Read> CommandLogReader<R> {
    /// Reader over `input`
    pub fn new(input: R) -> Self {
        Self {
            input,
            buffer: Vec::with_capacity(256),
            commands_read: 0,
        }
    }

    /// Next command, or `None` at end of log
    pub fn next_command(&mut self, resolver: &dyn IndexResolver) -> Result<Option<MutationCommand>> {
        let cmd = read_command(&mut self.input, &mut self.buffer, resolver)?;
        if cmd.is_some() {
            self.commands_read += 1;
        }
        Ok(cmd)
    }

    /// Every remaining command, in log order
    pub fn read_all(&mut self, resolver: &dyn IndexResolver) -> Result<Vec<MutationCommand>> {
        let mut commands = Vec::new();
        while let Some(cmd) = self.next_command(resolver)? {
            commands.push(cmd);
        }
        Ok(commands)
    }

    /// Commands returned so far
    pub fn commands_read(&self) -> u64 {
        self.commands_read
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> R {
        self.input
    }
}
