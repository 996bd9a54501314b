/// Errors that can occur while encoding or decoding wire structures.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A structure was shorter than its fixed layout requires.
    #[error("truncated {what} ({available} bytes, need {needed})")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// A message declared a payload larger than the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A capability list points outside the message that carries it.
    #[error("capability list at offset {offset} ({count} words) overruns {len}-byte message")]
    CapsOutOfBounds {
        offset: usize,
        count: usize,
        len: usize,
    },

    /// A declared count does not fit the wire field that carries it.
    #[error("{what} count {count} does not fit its wire field")]
    CountOverflow { what: &'static str, count: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Fail with [`FrameError::Truncated`] unless `available >= needed`.
pub(crate) fn ensure(what: &'static str, available: usize, needed: usize) -> Result<()> {
    if available < needed {
        return Err(FrameError::Truncated {
            what,
            needed,
            available,
        });
    }
    Ok(())
}
