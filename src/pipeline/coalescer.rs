//! Input coalescing
//!
//! The pipeline receives bursty input (camera every frame, settings sliders,
//! clip-plane edits) but wants to cull far less often. [`ChannelCoalescer`]
//! holds the latest value per channel together with a deadline for when it
//! may be released:
//!
//! - settings (budget + hints) and geometry filters (clip planes +
//!   prioritized areas) wait for a quiet period; every push resets the timer;
//! - a moving camera is throttled to one release per throttle period;
//! - a camera that stopped moving is released immediately, bypassing the
//!   throttle.
//!
//! All methods take an explicit `Instant` so the logic is testable without a
//! runtime; the pipeline task feeds it `Instant::now()` and sleeps until
//! [`ChannelCoalescer::next_deadline`].

use std::time::Duration;

use tokio::time::Instant;

use crate::camera::{CameraPose, Plane};
use crate::culling::{LoadingHints, PrioritizedArea, SectorBudget};

pub const SETTINGS_DEBOUNCE: Duration = Duration::from_millis(250);
pub const CAMERA_THROTTLE: Duration = Duration::from_millis(500);

/// Camera channel value: a pose plus whether the camera was still moving
/// when it was sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInput {
    pub pose: CameraPose,
    pub in_motion: bool,
}

/// Accumulated settings-channel updates, merged across pushes within one
/// quiet period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub budget: Option<SectorBudget>,
    pub hints: Option<LoadingHints>,
}

/// Accumulated geometry-filter updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterUpdate {
    pub clip_planes: Option<Vec<Plane>>,
    pub prioritized_areas: Option<Vec<PrioritizedArea>>,
}

/// Everything released by one [`ChannelCoalescer::take_ready`] call.
#[derive(Debug, Default)]
pub struct ReadyUpdates {
    pub settings: Option<SettingsUpdate>,
    pub filters: Option<FilterUpdate>,
    pub camera: Option<CameraInput>,
}

impl ReadyUpdates {
    pub fn is_empty(&self) -> bool {
        self.settings.is_none() && self.filters.is_none() && self.camera.is_none()
    }
}

pub struct ChannelCoalescer {
    settings: SettingsUpdate,
    settings_deadline: Option<Instant>,
    filters: FilterUpdate,
    filters_deadline: Option<Instant>,
    camera: Option<CameraInput>,
    camera_deadline: Option<Instant>,
    last_camera_release: Option<Instant>,
    debounce: Duration,
    throttle: Duration,
}

impl ChannelCoalescer {
    pub fn new() -> Self {
        Self::with_periods(SETTINGS_DEBOUNCE, CAMERA_THROTTLE)
    }

    pub fn with_periods(debounce: Duration, throttle: Duration) -> Self {
        Self {
            settings: SettingsUpdate::default(),
            settings_deadline: None,
            filters: FilterUpdate::default(),
            filters_deadline: None,
            camera: None,
            camera_deadline: None,
            last_camera_release: None,
            debounce,
            throttle,
        }
    }

    pub fn push_budget(&mut self, budget: SectorBudget, now: Instant) {
        self.settings.budget = Some(budget);
        self.settings_deadline = Some(now + self.debounce);
    }

    pub fn push_hints(&mut self, hints: LoadingHints, now: Instant) {
        self.settings.hints = Some(hints);
        self.settings_deadline = Some(now + self.debounce);
    }

    pub fn push_clip_planes(&mut self, planes: Vec<Plane>, now: Instant) {
        self.filters.clip_planes = Some(planes);
        self.filters_deadline = Some(now + self.debounce);
    }

    pub fn push_prioritized_areas(&mut self, areas: Vec<PrioritizedArea>, now: Instant) {
        self.filters.prioritized_areas = Some(areas);
        self.filters_deadline = Some(now + self.debounce);
    }

    pub fn push_camera(&mut self, camera: CameraInput, now: Instant) {
        let in_motion = camera.in_motion;
        self.camera = Some(camera);
        if !in_motion {
            // Stop transitions release unconditionally, even mid-throttle.
            self.camera_deadline = Some(now);
            return;
        }
        let throttled = match self.last_camera_release {
            Some(last) if now < last + self.throttle => last + self.throttle,
            _ => now,
        };
        self.camera_deadline = Some(match self.camera_deadline {
            Some(pending) => pending.min(throttled),
            None => throttled,
        });
    }

    /// Earliest instant at which a pending value becomes releasable, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.settings_deadline, self.filters_deadline, self.camera_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    /// Releases every channel whose deadline has passed.
    pub fn take_ready(&mut self, now: Instant) -> ReadyUpdates {
        let mut ready = ReadyUpdates::default();
        if self.settings_deadline.is_some_and(|deadline| deadline <= now) {
            ready.settings = Some(std::mem::take(&mut self.settings));
            self.settings_deadline = None;
        }
        if self.filters_deadline.is_some_and(|deadline| deadline <= now) {
            ready.filters = Some(std::mem::take(&mut self.filters));
            self.filters_deadline = None;
        }
        if self.camera_deadline.is_some_and(|deadline| deadline <= now) {
            ready.camera = self.camera.take();
            self.camera_deadline = None;
            self.last_camera_release = Some(now);
        }
        ready
    }
}

impl Default for ChannelCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn camera(in_motion: bool) -> CameraInput {
        CameraInput {
            pose: CameraPose::look_at(
                Vec3::new(0.0, 0.0, 10.0),
                Vec3::ZERO,
                Vec3::Y,
                std::f32::consts::FRAC_PI_3,
                1.0,
                0.1,
                100.0,
            ),
            in_motion,
        }
    }

    #[test]
    fn settings_wait_for_a_quiet_period() {
        let mut coalescer = ChannelCoalescer::new();
        let start = Instant::now();
        coalescer.push_budget(SectorBudget::default(), start);

        assert!(coalescer.take_ready(start + Duration::from_millis(100)).is_empty());
        let ready = coalescer.take_ready(start + SETTINGS_DEBOUNCE);
        assert!(ready.settings.is_some_and(|s| s.budget.is_some()));
        assert!(coalescer.next_deadline().is_none());
    }

    #[test]
    fn every_push_resets_the_quiet_period() {
        let mut coalescer = ChannelCoalescer::new();
        let start = Instant::now();
        coalescer.push_hints(LoadingHints { suspend_loading: true }, start);
        let later = start + Duration::from_millis(200);
        coalescer.push_budget(SectorBudget::default(), later);

        // The first deadline has passed but the second push moved it.
        assert!(coalescer.take_ready(start + SETTINGS_DEBOUNCE).is_empty());
        let ready = coalescer.take_ready(later + SETTINGS_DEBOUNCE);
        let settings = ready.settings.unwrap();
        assert!(settings.budget.is_some());
        assert_eq!(settings.hints, Some(LoadingHints { suspend_loading: true }));
    }

    #[test]
    fn moving_camera_is_throttled_to_one_release_per_period() {
        let mut coalescer = ChannelCoalescer::new();
        let start = Instant::now();
        coalescer.push_camera(camera(true), start);
        assert!(coalescer.take_ready(start).camera.is_some());

        // Within the throttle window the next sample has to wait.
        let soon = start + Duration::from_millis(100);
        coalescer.push_camera(camera(true), soon);
        assert!(coalescer.take_ready(soon).camera.is_none());
        assert_eq!(coalescer.next_deadline(), Some(start + CAMERA_THROTTLE));
        assert!(coalescer.take_ready(start + CAMERA_THROTTLE).camera.is_some());
    }

    #[test]
    fn camera_stop_is_released_immediately() {
        let mut coalescer = ChannelCoalescer::new();
        let start = Instant::now();
        coalescer.push_camera(camera(true), start);
        assert!(coalescer.take_ready(start).camera.is_some());

        let soon = start + Duration::from_millis(50);
        coalescer.push_camera(camera(false), soon);
        let released = coalescer.take_ready(soon).camera.unwrap();
        assert!(!released.in_motion);
    }

    #[test]
    fn next_deadline_is_the_earliest_pending_one() {
        let mut coalescer = ChannelCoalescer::new();
        let start = Instant::now();
        coalescer.push_clip_planes(Vec::new(), start);
        coalescer.push_camera(camera(false), start + Duration::from_millis(10));
        assert_eq!(coalescer.next_deadline(), Some(start + Duration::from_millis(10)));
    }
}
