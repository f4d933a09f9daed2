// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
#![no_main]
use libfuzzer_sys::fuzz_target;

use enough::Unstoppable;
use heif_uncompressed::{
    decode_uncompressed_image_with_stop, DataExtent, DecodeLimits, ParseOptions, UncompressedProperties,
};

// Same input layout as fuzz_decode, with lenient parsing and tight limits.
fuzz_target!(|data: &[u8]| {
    let Some((head, rest)) = data.split_first_chunk::<2>() else { return };
    let split = usize::from(u16::from_be_bytes(*head)).min(rest.len());
    let (boxes, payload) = rest.split_at(split);

    let options = ParseOptions { lenient: true };
    let Ok(properties) = UncompressedProperties::from_property_boxes_with_options(boxes, &options) else { return };
    let limits = DecodeLimits::default()
        .with_max_image_pixels(1 << 20)
        .with_max_tiles(256)
        .with_max_memory_block(16 << 20);
    let _ = decode_uncompressed_image_with_stop(&properties, DataExtent::from_memory(payload), &limits, &Unstoppable);
});
