//! Structured logging helpers.
//!
//! Block and vote events share a fixed set of fields so log pipelines can
//! filter on `block_height` or `voter_index` without parsing messages.

/// Log a block-related event with standard fields.
///
/// `$block_hash` must implement `Display`, e.g. `short_hex(&hash)`.
#[macro_export]
macro_rules! log_block_event {
    ($level:ident, $msg:expr, $block_height:expr, $block_hash:expr $(, $($field:tt)*)?) => {
        $crate::logging::tracing::$level!(
            subsystem = "snq",
            block_height = $block_height,
            block_hash = %$block_hash,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a checkpoint-vote event with standard fields.
#[macro_export]
macro_rules! log_vote_event {
    ($level:ident, $msg:expr, $height:expr, $voter_index:expr $(, $($field:tt)*)?) => {
        $crate::logging::tracing::$level!(
            subsystem = "snq",
            height = $height,
            voter_index = $voter_index,
            $($($field)*,)?
            $msg
        )
    };
}

#[doc(hidden)]
pub use tracing;
