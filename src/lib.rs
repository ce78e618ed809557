/*
 * Copyright (C) 2025 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Incremental HTTP/1.x message parsing for fragmented byte streams.
//!
//! A [`parser::MessageParser`] receives stream bytes in arbitrarily
//! sized chunks, with no assumption that message boundaries align with
//! read boundaries, and produces ordered message lifecycle events. Both
//! directions are covered: [`parser::RequestParser`] and
//! [`parser::ResponseParser`] share all parsing logic and differ only in
//! start line grammar.

pub mod buffer;
pub mod decode;
pub mod parser;
