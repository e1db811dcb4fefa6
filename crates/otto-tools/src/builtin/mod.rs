// SPDX-License-Identifier: MIT
pub mod echo;
pub mod web_fetch;
