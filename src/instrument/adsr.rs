// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
/// Release times shorter than this click, so they are lengthened.
pub const MIN_RELEASE_FRAMES: f32 = 256.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdsrPhase {
    Attack,
    Decay,
    Sustain,
    Release,
    Idle,
}

/// A linear attack/decay/sustain/release envelope. Times are in frames.
///
/// Instruments hold a template envelope and every note plays its own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Adsr {
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    phase: AdsrPhase,
    ticks: f32,
    value: f32,
    release_value: f32,
}

impl Default for Adsr {
    fn default() -> Self {
        Adsr::new(0.0, 0.0, 1.0, 1000.0)
    }
}

impl Adsr {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Adsr {
        Adsr {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(MIN_RELEASE_FRAMES),
            phase: AdsrPhase::Attack,
            ticks: 0.0,
            value: 0.0,
            release_value: 0.0,
        }
    }

    pub fn attack(&self) -> f32 {
        self.attack
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn sustain(&self) -> f32 {
        self.sustain
    }

    pub fn release_frames(&self) -> f32 {
        self.release
    }

    pub fn phase(&self) -> AdsrPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == AdsrPhase::Idle
    }

    /// Rewinds to the start of the attack.
    pub fn reset(&mut self) {
        self.phase = AdsrPhase::Attack;
        self.ticks = 0.0;
        self.value = 0.0;
        self.release_value = 0.0;
    }

    /// Returns the level for the current frame and moves the envelope on by
    /// `step` frames.
    pub fn get_value(&mut self, step: f32) -> f32 {
        match self.phase {
            AdsrPhase::Attack => {
                self.value = if self.attack == 0.0 {
                    1.0
                } else {
                    (self.ticks / self.attack).min(1.0)
                };
                self.advance(step, self.attack, AdsrPhase::Decay);
            }
            AdsrPhase::Decay => {
                self.value = if self.decay == 0.0 {
                    self.sustain
                } else {
                    1.0 - (1.0 - self.sustain) * (self.ticks / self.decay).min(1.0)
                };
                self.advance(step, self.decay, AdsrPhase::Sustain);
            }
            AdsrPhase::Sustain => self.value = self.sustain,
            AdsrPhase::Release => {
                self.value = self.release_value * (1.0 - self.ticks / self.release).max(0.0);
                self.advance(step, self.release, AdsrPhase::Idle);
            }
            AdsrPhase::Idle => self.value = 0.0,
        }
        self.value
    }

    /// Starts the release from the current level. Returns false once the
    /// release has completed and the envelope is silent.
    pub fn release(&mut self) -> bool {
        match self.phase {
            AdsrPhase::Idle => false,
            AdsrPhase::Release => true,
            _ => {
                self.release_value = self.value;
                self.phase = AdsrPhase::Release;
                self.ticks = 0.0;
                true
            }
        }
    }

    fn advance(&mut self, step: f32, length: f32, next: AdsrPhase) {
        self.ticks += step;
        if self.ticks > length {
            self.phase = next;
            self.ticks = 0.0;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn attack_decay_sustain() {
        let mut adsr = Adsr::new(4.0, 4.0, 0.5, 300.0);
        let levels: Vec<f32> = (0..12).map(|_| adsr.get_value(1.0)).collect();
        assert_eq!(
            vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.0, 0.875, 0.75, 0.625, 0.5, 0.5, 0.5],
            levels
        );
        assert_eq!(AdsrPhase::Sustain, adsr.phase());
    }

    #[test]
    fn zero_attack_starts_at_full_level() {
        let mut adsr = Adsr::default();
        assert_eq!(1.0, adsr.get_value(1.0));
        assert_eq!(1.0, adsr.get_value(1.0));
        assert_eq!(1.0, adsr.get_value(1.0));
    }

    #[test]
    fn release_completes() {
        let mut adsr = Adsr::new(0.0, 0.0, 1.0, 300.0);
        adsr.get_value(1.0);
        assert!(adsr.release());

        let mut last = 1.0;
        let mut frames = 0;
        while adsr.release() {
            let level = adsr.get_value(1.0);
            assert!(level <= last);
            last = level;
            frames += 1;
        }
        assert_eq!(301, frames);
        assert!(adsr.is_idle());
        assert_eq!(0.0, adsr.get_value(1.0));
    }

    #[test]
    fn short_releases_are_lengthened() {
        assert_eq!(MIN_RELEASE_FRAMES, Adsr::new(0.0, 0.0, 1.0, 10.0).release_frames());
    }

    #[test]
    fn step_scales_time() {
        let mut adsr = Adsr::new(8.0, 0.0, 1.0, 300.0);
        adsr.get_value(2.0);
        assert_eq!(0.25, adsr.get_value(2.0));
    }
}
