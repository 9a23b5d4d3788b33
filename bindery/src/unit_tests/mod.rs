// Copyright (c) The bindery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod analyzer_tests;
mod graph_tests;
