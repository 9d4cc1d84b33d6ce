// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! # Headers Utility Module
//!
//! Lookup of a single header value in the header shapes Envoy sends to a
//! callout: the ordered `HeaderMap` used by ext_proc (and optionally by
//! ext_authz) and the flattened `map<string, string>` used by ext_authz.
//!
//! Keys are compared byte for byte. Envoy lowercases header names before
//! calling out, so no normalization is applied here.

use crate::envoy::config::core::v3::{HeaderMap, HeaderValue};
use std::borrow::Cow;
use std::collections::HashMap;

/// A set of request or response headers that can be searched by key.
pub trait HeaderSource {
    /// Returns the value of the first header whose key equals `key`.
    fn header(&self, key: &str) -> Option<Cow<'_, str>>;
}

impl HeaderSource for HeaderMap {
    fn header(&self, key: &str) -> Option<Cow<'_, str>> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(header_value)
    }
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// Returns the textual value of a header entry.
///
/// Envoy fills either `raw_value` or `value` depending on its configuration;
/// `raw_value` wins when both are set. Invalid UTF-8 is replaced lossily.
pub fn header_value(header: &HeaderValue) -> Cow<'_, str> {
    if header.raw_value.is_empty() {
        Cow::Borrowed(header.value.as_str())
    } else {
        String::from_utf8_lossy(&header.raw_value)
    }
}

/// Finds `key` in `headers`, returning `None` when no entry matches.
pub fn find_header<'a, S: HeaderSource + ?Sized>(headers: &'a S, key: &str) -> Option<Cow<'a, str>> {
    headers.header(key)
}
