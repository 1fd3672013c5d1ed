//! IMAP command handlers for the fake server, grouped by what they
//! touch: session state, folders, search, fetch and flags.

mod folders;
mod session;

pub use fetch::{FetchItem, handle_uid_fetch};
pub use flags::{StoreArgs, handle_expunge, handle_uid_store};
pub use folders::{handle_list, handle_select};
pub use search::handle_uid_search;
pub use session::{handle_capability, handle_login, handle_logout, handle_noop};
