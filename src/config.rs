// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Snapping configuration.
//!
//! A [`SnapConfig`] is read from TOML. Every section and every field has a
//! default, so an empty file is a valid configuration:
//!
//! ```toml
//! [snap]
//! n_smooth_patch = 3
//! snap_tol = 2.0
//!
//! [motion]
//! error_reduction = 0.75
//!
//! [quality]
//! max_non_ortho = 65.0
//! ```

use crate::error::{MeshError, Result as MeshResult};
use crate::motion::Diffusivity;
use crate::utils::math::SMALL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete configuration of a snapping run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    pub snap: SnapParameters,
    pub motion: MotionParameters,
    pub quality: MeshQuality,
}

/// Controls of the snap driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapParameters {
    /// Smoothing iterations of the patch points before snapping
    pub n_smooth_patch: usize,
    /// Snap distance as a multiple of the local edge length
    pub snap_tol: f64,
    /// Smoothing iterations of the displacement into the interior
    pub n_smooth_disp: usize,
    /// Scale-and-check iterations per displacement
    pub n_snap: usize,
    /// Feature attraction iterations; zero disables feature snapping
    pub n_feature_snap: usize,
    /// Faces meeting at an angle with a cosine below this form a feature
    pub feature_cos: f64,
    /// Distance below which two patch points count as collocated
    pub merge_tol: f64,
}

impl Default for SnapParameters {
    fn default() -> Self {
        Self {
            n_smooth_patch: 3,
            snap_tol: 2.0,
            n_smooth_disp: 30,
            n_snap: 5,
            n_feature_snap: 0,
            feature_cos: 45f64.to_radians().cos(),
            merge_tol: SMALL,
        }
    }
}

/// Backoff policy of the motion smoother
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionParameters {
    /// Factor applied to the scale at points near faces failing the checks
    pub error_reduction: f64,
    /// Point/face layers around a failing face whose scale is reduced
    pub n_smooth_scale: usize,
    pub diffusivity: Diffusivity,
}

impl Default for MotionParameters {
    fn default() -> Self {
        Self {
            error_reduction: 0.75,
            n_smooth_scale: 4,
            diffusivity: Diffusivity::InverseDistance,
        }
    }
}

/// Quality thresholds checked after every trial motion. An absent threshold
/// disables its check; so does a negative one, except for `min_vol` and
/// `min_twist` where negative values are meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshQuality {
    /// Maximum non-orthogonality in degrees
    pub max_non_ortho: Option<f64>,
    pub max_boundary_skewness: Option<f64>,
    pub max_internal_skewness: Option<f64>,
    /// Maximum face concavity in degrees
    pub max_concave: Option<f64>,
    /// Minimum pyramid volume
    pub min_vol: Option<f64>,
    pub min_area: Option<f64>,
    /// Minimum cosine between the face triangles and the face direction
    pub min_twist: Option<f64>,
    /// Minimum normalised cell determinant; 1 for a cube
    pub min_determinant: Option<f64>,
    /// Minimum interpolation weight, 0.5 for a uniform mesh
    pub min_face_weight: Option<f64>,
    /// Minimum volume ratio of neighbouring cells
    pub min_vol_ratio: Option<f64>,
    pub max_aspect_ratio: Option<f64>,
}

impl Default for MeshQuality {
    fn default() -> Self {
        Self {
            max_non_ortho: Some(65.0),
            max_boundary_skewness: Some(20.0),
            max_internal_skewness: Some(4.0),
            max_concave: Some(80.0),
            min_vol: Some(1e-13),
            min_area: Some(-1.0),
            min_twist: Some(0.05),
            min_determinant: Some(0.001),
            min_face_weight: Some(0.05),
            min_vol_ratio: Some(0.01),
            max_aspect_ratio: None,
        }
    }
}

impl MeshQuality {
    /// No checks at all
    pub fn disabled() -> Self {
        Self {
            max_non_ortho: None,
            max_boundary_skewness: None,
            max_internal_skewness: None,
            max_concave: None,
            min_vol: None,
            min_area: None,
            min_twist: None,
            min_determinant: None,
            min_face_weight: None,
            min_vol_ratio: None,
            max_aspect_ratio: None,
        }
    }

    /// Threshold of a check if it is enabled
    pub fn enabled(threshold: Option<f64>) -> Option<f64> {
        threshold.filter(|&v| v >= 0.0)
    }

    pub fn validate(&self) -> MeshResult<()> {
        if let Some(v) = Self::enabled(self.max_non_ortho) {
            if v > 180.0 {
                return Err(MeshError::invalid_param(
                    "max_non_ortho",
                    format!("{} is not an angle in [0, 180]", v),
                ));
            }
        }
        if let Some(v) = Self::enabled(self.max_concave) {
            if v > 180.0 + SMALL {
                return Err(MeshError::invalid_param(
                    "max_concave",
                    format!("{} is not an angle in [0, 180]", v),
                ));
            }
        }
        if let Some(v) = self.min_twist {
            if !(-1.0 - SMALL..=1.0 + SMALL).contains(&v) {
                return Err(MeshError::invalid_param(
                    "min_twist",
                    format!("{} is not a cosine in [-1, 1]", v),
                ));
            }
        }
        if let Some(v) = Self::enabled(self.min_face_weight) {
            if v > 0.5 {
                return Err(MeshError::invalid_param(
                    "min_face_weight",
                    format!("{} exceeds the largest possible weight 0.5", v),
                ));
            }
        }
        Ok(())
    }
}

impl SnapConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: SnapConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load `polysnap.toml` if present, then apply `POLYSNAP_*` environment
    /// overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from("polysnap.toml").exists() {
            Self::from_file("polysnap.toml")?
        } else {
            Self::default()
        };

        if let Ok(v) = std::env::var("POLYSNAP_SNAP_TOL") {
            config.snap.snap_tol = v.parse().context("POLYSNAP_SNAP_TOL is not a number")?;
        }
        if let Ok(v) = std::env::var("POLYSNAP_N_SMOOTH_PATCH") {
            config.snap.n_smooth_patch =
                v.parse().context("POLYSNAP_N_SMOOTH_PATCH is not a count")?;
        }
        if let Ok(v) = std::env::var("POLYSNAP_N_SNAP") {
            config.snap.n_snap = v.parse().context("POLYSNAP_N_SNAP is not a count")?;
        }
        if let Ok(v) = std::env::var("POLYSNAP_N_FEATURE_SNAP") {
            config.snap.n_feature_snap =
                v.parse().context("POLYSNAP_N_FEATURE_SNAP is not a count")?;
        }
        if let Ok(v) = std::env::var("POLYSNAP_ERROR_REDUCTION") {
            config.motion.error_reduction =
                v.parse().context("POLYSNAP_ERROR_REDUCTION is not a number")?;
        }
        if let Ok(v) = std::env::var("POLYSNAP_MAX_NON_ORTHO") {
            config.quality.max_non_ortho =
                Some(v.parse().context("POLYSNAP_MAX_NON_ORTHO is not a number")?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn validate(&self) -> MeshResult<()> {
        self.quality.validate()?;
        if !(0.0..=1.0).contains(&self.motion.error_reduction) {
            return Err(MeshError::invalid_param(
                "error_reduction",
                format!("{} is not a factor in [0, 1]", self.motion.error_reduction),
            ));
        }
        if self.snap.snap_tol <= 0.0 {
            return Err(MeshError::invalid_param(
                "snap_tol",
                format!("{} must be positive", self.snap.snap_tol),
            ));
        }
        Ok(())
    }
}
