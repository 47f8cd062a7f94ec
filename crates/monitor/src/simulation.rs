//! Simulated sensors for the demo building
//!
//! Each sensor follows a daily cosine around a per-type baseline, plus
//! Gaussian noise, occasional multiplicative spikes and an optional
//! probability of a failed read. Every sensor owns a seeded RNG so a demo
//! run is reproducible for a given seed.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Timelike, Utc};
use monitor_lib::monitor::{async_trait, SensorRegistry, SensorSource};
use monitor_lib::{Metadata, SensorError, SensorInfo, SensorReading};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{debug, info};

/// Spacing between zone centres in metres, wider than the default
/// adjacency radius so zones only connect through shared zone ids
const ZONE_SPACING: f64 = 30.0;

/// Shape of a simulated signal
#[derive(Debug, Clone, PartialEq)]
pub struct SignalProfile {
    pub unit: &'static str,
    pub baseline: f64,
    /// Half the peak-to-trough swing over a day
    pub amplitude: f64,
    /// Hour of day (UTC) at which the signal peaks
    pub peak_hour: f64,
    pub noise_std: f64,
    pub spike_probability: f64,
    /// Multiplier applied to the value when a spike fires
    pub spike_magnitude: f64,
    /// Clamp values at zero
    pub non_negative: bool,
}

impl SignalProfile {
    pub fn for_sensor_type(sensor_type: &str) -> Self {
        match sensor_type {
            "temperature" => Self {
                unit: "°C",
                baseline: 21.0,
                amplitude: 2.0,
                peak_hour: 15.0,
                noise_std: 0.3,
                spike_probability: 0.0,
                spike_magnitude: 1.0,
                non_negative: false,
            },
            "lighting_illuminance" => Self {
                unit: "lux",
                baseline: 400.0,
                amplitude: 250.0,
                peak_hour: 13.0,
                noise_std: 20.0,
                spike_probability: 0.0,
                spike_magnitude: 1.0,
                non_negative: true,
            },
            "occupancy" => Self {
                unit: "people",
                baseline: 12.0,
                amplitude: 10.0,
                peak_hour: 12.0,
                noise_std: 1.5,
                spike_probability: 0.0,
                spike_magnitude: 1.0,
                non_negative: true,
            },
            "energy_power" => Self {
                unit: "kW",
                baseline: 45.0,
                amplitude: 20.0,
                peak_hour: 14.0,
                noise_std: 2.0,
                spike_probability: 0.01,
                spike_magnitude: 3.0,
                non_negative: true,
            },
            _ => Self {
                unit: "",
                baseline: 0.0,
                amplitude: 0.0,
                peak_hour: 12.0,
                noise_std: 1.0,
                spike_probability: 0.0,
                spike_magnitude: 1.0,
                non_negative: false,
            },
        }
    }

    /// Noise-free value at `at`
    pub fn expected_at(&self, at: DateTime<Utc>) -> f64 {
        let hour = at.hour() as f64 + at.minute() as f64 / 60.0;
        self.baseline + self.amplitude * (2.0 * PI * (hour - self.peak_hour) / 24.0).cos()
    }
}

struct SimState {
    rng: StdRng,
    noise: Normal<f64>,
}

pub struct SimulatedSensor {
    info: SensorInfo,
    profile: SignalProfile,
    failure_probability: f64,
    active: AtomicBool,
    state: Mutex<SimState>,
}

impl SimulatedSensor {
    pub fn new(info: SensorInfo, seed: u64, failure_probability: f64) -> Result<Self> {
        let profile = SignalProfile::for_sensor_type(&info.sensor_type);
        Self::with_profile(info, profile, seed, failure_probability)
    }

    pub fn with_profile(
        info: SensorInfo,
        profile: SignalProfile,
        seed: u64,
        failure_probability: f64,
    ) -> Result<Self> {
        let noise = Normal::new(0.0, profile.noise_std)
            .map_err(|e| anyhow!("invalid noise level for {}: {}", info.sensor_id, e))?;

        Ok(Self {
            info,
            profile,
            failure_probability: if failure_probability.is_finite() {
                failure_probability.clamp(0.0, 1.0)
            } else {
                0.0
            },
            active: AtomicBool::new(true),
            state: Mutex::new(SimState {
                rng: StdRng::seed_from_u64(seed),
                noise,
            }),
        })
    }

    pub fn profile(&self) -> &SignalProfile {
        &self.profile
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Draw one value for `at`; `None` when the simulated read fails
    fn sample(&self, at: DateTime<Utc>) -> Option<(f64, f64, bool)> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let SimState { rng, noise } = &mut *state;

        if rng.gen_bool(self.failure_probability) {
            return None;
        }

        let mut value = self.profile.expected_at(at) + noise.sample(rng);
        let spiked = self.profile.spike_probability > 0.0
            && rng.gen_bool(self.profile.spike_probability.min(1.0));
        if spiked {
            value *= self.profile.spike_magnitude;
        }
        if self.profile.non_negative {
            value = value.max(0.0);
        }

        let quality = rng.gen_range(0.9..=1.0);
        Some((value, quality, spiked))
    }
}

#[async_trait]
impl SensorSource for SimulatedSensor {
    fn info(&self) -> &SensorInfo {
        &self.info
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn take_reading(&self) -> Result<SensorReading, SensorError> {
        if !self.is_active() {
            return Err(SensorError::Inactive {
                sensor_id: self.info.sensor_id.clone(),
            });
        }

        let timestamp = Utc::now();
        let (value, quality, spiked) =
            self.sample(timestamp).ok_or_else(|| SensorError::ReadFailed {
                sensor_id: self.info.sensor_id.clone(),
                reason: "simulated communication timeout".to_string(),
            })?;

        let mut metadata = Metadata::new();
        if spiked {
            debug!(sensor_id = %self.info.sensor_id, value, "Injected simulated spike");
            metadata.insert("simulated_spike".to_string(), serde_json::Value::Bool(true));
        }

        Ok(SensorReading {
            timestamp,
            value,
            unit: self.info.unit.clone(),
            quality,
            metadata,
        })
    }
}

/// Sensor kinds placed in every demo zone, as (id prefix, sensor type)
pub const ZONE_SENSOR_KINDS: [(&str, &str); 4] = [
    ("temp", "temperature"),
    ("light", "lighting_illuminance"),
    ("occ", "occupancy"),
    ("energy", "energy_power"),
];

/// A registry populated with `zones` zones of simulated sensors
pub fn demo_registry(zones: usize, seed: u64, failure_probability: f64) -> Result<SensorRegistry> {
    let registry = SensorRegistry::new();

    for zone in 1..=zones {
        let zone_id = format!("zone_{}", zone);
        let x = (zone - 1) as f64 * ZONE_SPACING;

        for (offset, (prefix, sensor_type)) in ZONE_SENSOR_KINDS.iter().enumerate() {
            let profile = SignalProfile::for_sensor_type(sensor_type);
            let info = SensorInfo::new(format!("{}_{}", prefix, zone_id), *sensor_type)
                .with_unit(profile.unit)
                .with_zone(zone_id.clone())
                .with_position(x + offset as f64 * 2.0, 0.0, 3.0);
            let sensor_seed = seed.wrapping_add((zone * ZONE_SENSOR_KINDS.len() + offset) as u64);
            let sensor = SimulatedSensor::with_profile(info, profile, sensor_seed, failure_probability)?;
            registry.register(Arc::new(sensor));
        }
    }

    info!(
        zones,
        sensors = registry.len(),
        seed,
        "Built simulated demo building"
    );
    Ok(registry)
}
