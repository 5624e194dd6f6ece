pub mod command;
pub mod handshake;
pub mod packet;
pub mod param;
pub mod primitive;
pub mod resolver;
pub mod response;
pub mod value;
