mod session_service_impl;
mod token_codec_jwt;

pub use session_service_impl::*;
pub use token_codec_jwt::*;
