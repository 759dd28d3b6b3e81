//! Pipeline state transport over standard input and output.
//!
//! Input is read to the end before parsing and output is rendered in full
//! before a single write, so a stage never sees half a document and a failed
//! render leaves stdout untouched.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::state::PipelineState;

/// Read one serialized state document from `reader`.
pub fn read_state<R: Read>(mut reader: R) -> Result<PipelineState> {
    let mut raw = String::new();
    reader
        .read_to_string(&mut raw)
        .context("read pipeline state from stdin")?;
    let state = PipelineState::parse(&raw)?;
    debug!(keys = state.len(), "pipeline state loaded");
    Ok(state)
}

/// Write `state` to `writer` as one document.
pub fn write_state<W: Write>(mut writer: W, state: &PipelineState) -> Result<()> {
    let buf = state.render()?;
    writer
        .write_all(buf.as_bytes())
        .context("write pipeline state to stdout")?;
    writer.flush().context("flush stdout")?;
    debug!(keys = state.len(), "pipeline state written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut state = PipelineState::new();
        state.set("vpcid", "vpc-1");
        state.set("message", 3);

        let mut buf = Vec::new();
        write_state(&mut buf, &state).expect("write");
        let loaded = read_state(buf.as_slice()).expect("read");
        assert_eq!(loaded, state);
    }

    #[test]
    fn malformed_input_is_an_error() {
        let err = read_state("{not json".as_bytes()).expect_err("should fail");
        assert!(format!("{err:#}").contains("parse pipeline state"));
    }
}
