// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! In-memory inventory document.
//!
//! A sectioned entity store with field validation, normalization to the
//! server JSON format, the checksum/postpone engine driving partial
//! inventories, and JSON / XML / HTML serialization.

pub mod checksum;
pub mod document;
pub mod normalize;
pub mod output;
pub mod sections;

pub use checksum::{ChecksumOutcome, LastState, SectionDigest};
pub use output::parse_xml_content;
pub use document::{
    sanitize_string, Format, Inventory, InventoryConfig, InventoryError, NormalizedInventory,
    PROVIDER,
};
pub use sections::{
    category_sections, glpi_version, is_singleton_section, known_categories, known_section,
    sections_for_categories, ALWAYS_KEEP_SECTIONS, CHECKED_SECTIONS,
};
