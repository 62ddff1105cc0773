pub mod game;
pub mod member;
pub mod protocol;
pub mod words;
