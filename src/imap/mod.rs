pub mod server;

pub use server::ImapServer;
