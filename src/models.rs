//! Shared models and types for the traffic console
//!
//! This module contains types shared across multiple modules
//! to avoid circular dependencies.

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Vehicle classes counted by the detection backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Van,
    Truck,
    Bus,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 4] = [
        VehicleClass::Car,
        VehicleClass::Van,
        VehicleClass::Truck,
        VehicleClass::Bus,
    ];

    /// Display label ("Car", "Van", ...)
    pub fn label(&self) -> &'static str {
        match self {
            VehicleClass::Car => "Car",
            VehicleClass::Van => "Van",
            VehicleClass::Truck => "Truck",
            VehicleClass::Bus => "Bus",
        }
    }
}

/// Per-class vehicle counts
///
/// Serialized as `{car, van, truck, bus}`, the shape both backends use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VehicleBreakdown {
    #[serde(default)]
    pub car: u64,
    #[serde(default)]
    pub van: u64,
    #[serde(default)]
    pub truck: u64,
    #[serde(default)]
    pub bus: u64,
}

impl VehicleBreakdown {
    /// Sum of all classes, saturating on producer-supplied counts
    pub fn total(&self) -> u64 {
        self.car
            .saturating_add(self.van)
            .saturating_add(self.truck)
            .saturating_add(self.bus)
    }
}

/// Model offered by the inference backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelChoice {
    /// Opaque identifier sent to the start call
    pub file: String,
    /// Key the operator selects by
    #[serde(rename = "name")]
    pub display_name: String,
}

/// Latest polled statistics for a running slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    pub total_vehicles: u64,
    pub breakdown: VehicleBreakdown,
    pub fps_in: f64,
    pub fps_processed: f64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_visible: Option<VehicleBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,
    /// Source as resolved by the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_via: Option<String>,
}

/// Export unit built from a running slot (`POST /sessions` body)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    #[serde(rename = "model")]
    pub model_name: String,
    #[serde(rename = "source")]
    pub source_description: String,
    #[serde(rename = "total")]
    pub total_vehicles: u64,
    pub breakdown: VehicleBreakdown,
    #[serde(rename = "avg_fps")]
    pub avg_fps_processed: f64,
}

/// Session record as persisted by the session backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub timestamp: String,
    pub model_used: String,
    pub source: String,
    pub total_vehicles: i64,
    #[serde(default)]
    pub car: i64,
    #[serde(default)]
    pub van: i64,
    #[serde(default)]
    pub truck: i64,
    #[serde(default)]
    pub bus: i64,
    #[serde(default)]
    pub avg_fps: Option<f64>,
}

impl StoredSession {
    pub fn count(&self, class: VehicleClass) -> i64 {
        match class {
            VehicleClass::Car => self.car,
            VehicleClass::Van => self.van,
            VehicleClass::Truck => self.truck,
            VehicleClass::Bus => self.bus,
        }
    }

    /// "Car 1500, Van 0, Truck 350, Bus 153"
    pub fn breakdown_display(&self) -> String {
        VehicleClass::ALL
            .iter()
            .map(|c| format!("{} {}", c.label(), self.count(*c)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
