// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Service configuration.
//!
//! [`Config`] holds the knobs the flows and the HTTP layer read. Collaborator
//! credentials are not part of it; the binary builds the collaborators
//! directly from its command line.

use crate::grant::CreditPolicy;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("reference price must be positive")]
    NonPositivePrice,
    #[error("reference credit bundle must be at least 1")]
    EmptyBundle,
    #[error("analysis cost must be at least 1 credit")]
    FreeAnalysis,
    #[error("{0} must not be zero")]
    Zero(&'static str),
    #[error("invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Price-to-credit conversion for captured payments. Default: 15.00 → 50.
    pub credit_policy: CreditPolicy,

    /// Credits one analysis costs. Default: 1.
    pub analysis_cost: u64,

    /// Deadline for every outbound collaborator call. Default: 30s.
    pub outbound_timeout: Duration,

    /// Characters of brief text sent to the model. Default: 60 000.
    pub max_prompt_chars: usize,

    /// Upper bound for uploaded files. Default: 25 MiB.
    pub max_upload_bytes: usize,

    /// Default checkout description.
    pub order_description: String,

    /// Buyer lands here after a successful capture, with `accountId` and
    /// `credits` appended as query parameters.
    pub success_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credit_policy: CreditPolicy::default(),
            analysis_cost: 1,
            outbound_timeout: Duration::from_secs(30),
            max_prompt_chars: 60_000,
            max_upload_bytes: 25 * 1024 * 1024,
            order_description: "Brief analysis credits".to_string(),
            success_url: "http://localhost:5173/success".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credit_policy.reference_price <= rust_decimal::Decimal::ZERO {
            return Err(ConfigError::NonPositivePrice);
        }
        if self.credit_policy.reference_credits == 0 {
            return Err(ConfigError::EmptyBundle);
        }
        if self.analysis_cost == 0 {
            return Err(ConfigError::FreeAnalysis);
        }
        if self.outbound_timeout.is_zero() {
            return Err(ConfigError::Zero("outbound timeout"));
        }
        if self.max_prompt_chars == 0 {
            return Err(ConfigError::Zero("max prompt chars"));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Zero("max upload bytes"));
        }
        if reqwest::Url::parse(&self.success_url).is_err() {
            return Err(ConfigError::InvalidUrl {
                field: "success_url",
                value: self.success_url.clone(),
            });
        }
        Ok(())
    }
}
