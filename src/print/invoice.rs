use std::time::Duration;

use crate::device::types::DeviceAddress;
use crate::error::EncodeError;
use crate::frame::commands::{self, Alignment, CRLF};
use crate::frame::{format_elapsed_ms, FrameBuilder, Operand};

fn extend(builder: FrameBuilder, operands: Vec<Operand>) -> FrameBuilder {
    operands.into_iter().fold(builder, FrameBuilder::operand)
}

/// A receipt reporting which device was claimed and how long the claim took.
pub fn sample_invoice(address: &DeviceAddress, claim_latency: Duration) -> Result<Vec<u8>, EncodeError> {
    let mut frame = FrameBuilder::new();

    frame = extend(frame, commands::init());
    frame = extend(frame, commands::status_back(0xff));
    frame = extend(frame, commands::standard_mode());
    frame = extend(frame, commands::align(Alignment::Center));

    frame = extend(frame, commands::char_size(1, 1));
    frame = extend(frame.text(format!("Current connection to{}", CRLF)), commands::feed_dots(16));

    frame = extend(frame, commands::char_size(2, 2));
    frame = extend(frame.text(format!("{}{}", address, CRLF)), commands::feed_dots(40));

    frame = extend(frame, commands::char_size(1, 1));
    frame = extend(frame.text(format!("takes{}", CRLF)), commands::feed_dots(16));

    frame = extend(frame, commands::char_size(5, 5));
    frame = frame.text(format_elapsed_ms(claim_latency));
    frame = extend(frame, commands::char_size(2, 2));
    frame = extend(frame.text(format!("ms{}", CRLF)), commands::feed_dots(160));

    frame = extend(frame, commands::partial_cut());
    frame = extend(frame, commands::buzzer(2, 1, 1));

    frame.finish()
}

/// The frame repeated by a fake print: one short buzz.
pub fn fake_print_frame() -> Result<Vec<u8>, EncodeError> {
    extend(FrameBuilder::new(), commands::buzzer(1, 1, 1)).finish()
}
