//! `warden-prompt` — turns a firing routine, reminder, or webhook into
//! the exact text the agent receives: tag line, bg preamble, forward
//! schedule, chain context, and the entry's own message.

pub mod assemble;
pub mod preamble;
pub mod schedule;

pub use assemble::{
    fork_started_prompt, fork_timeout_escalated_prompt, fork_timeout_prompt, reminder_prompt,
    routine_prompt, webhook_prompt,
};
pub use preamble::bg_preamble;
pub use schedule::{forward_schedule, ScheduleEntry};
