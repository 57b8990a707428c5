use crate::config::ServerConfig;
use crate::services::decoder::{Decoder, create_decoder};
use std::sync::Arc;
use tracing::info;

pub fn setup_decoder(config: &ServerConfig) -> Arc<dyn Decoder> {
    let decoder = create_decoder(
        &config.decoder_type,
        &config.decoder_program,
        config.decoder_output_mode,
        config.decoder_timeout,
    );

    info!(
        "🔓 Decoder: {} (output via {:?}, timeout {:?}, max {} concurrent)",
        decoder.name(),
        config.decoder_output_mode,
        config.decoder_timeout,
        config.max_concurrent_decodes
    );

    decoder.into()
}
