pub mod bytesize;
pub mod dns;
pub mod email;
pub mod quotes;

pub use bytesize::parse_byte_size;
pub use email::{is_valid_address, split_address};
pub use quotes::split_quotes;
