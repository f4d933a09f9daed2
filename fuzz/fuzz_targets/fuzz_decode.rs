// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
#![no_main]
use libfuzzer_sys::fuzz_target;

use heif_uncompressed::{decode_uncompressed_image, DataExtent, DecodeLimits, UncompressedProperties};

// First two bytes: length of the property box stream, the rest is item data.
fuzz_target!(|data: &[u8]| {
    let Some((head, rest)) = data.split_first_chunk::<2>() else { return };
    let split = usize::from(u16::from_be_bytes(*head)).min(rest.len());
    let (boxes, payload) = rest.split_at(split);

    let Ok(properties) = UncompressedProperties::from_property_boxes(boxes) else { return };
    let _ = decode_uncompressed_image(&properties, DataExtent::from_memory(payload), &DecodeLimits::default());
});
