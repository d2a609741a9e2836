/// Three-band summary of the smoothed spectrum, for shader uniforms (each 0.0-1.0)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandLevels {
    pub bass: f32, // 20-250 Hz
    pub mid: f32,  // 250-4000 Hz
    pub high: f32, // 4 kHz - Nyquist
}

const BASS_HZ: (f32, f32) = (20.0, 250.0);
const MID_HZ: (f32, f32) = (250.0, 4000.0);
const HIGH_LOW_HZ: f32 = 4000.0;

impl BandLevels {
    /// Mean of the bins whose centre frequency falls in each band.
    pub fn from_magnitudes(magnitudes: &[f32], sample_rate: u32, fft_size: usize) -> Self {
        let freq_resolution = sample_rate as f32 / fft_size as f32;
        let nyquist = sample_rate as f32 / 2.0;

        let band_mean = |low_hz: f32, high_hz: f32| -> f32 {
            let low_bin = (low_hz / freq_resolution).ceil() as usize;
            let high_bin = ((high_hz / freq_resolution).ceil() as usize).min(magnitudes.len());
            if low_bin >= high_bin {
                return 0.0;
            }
            let bins = &magnitudes[low_bin..high_bin];
            bins.iter().sum::<f32>() / bins.len() as f32
        };

        Self {
            bass: band_mean(BASS_HZ.0, BASS_HZ.1),
            mid: band_mean(MID_HZ.0, MID_HZ.1),
            high: band_mean(HIGH_LOW_HZ, nyquist),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_spectrum_has_no_energy() {
        let levels = BandLevels::from_magnitudes(&vec![0.0; 1024], 44100, 2048);
        assert_eq!(levels, BandLevels::default());
    }

    #[test]
    fn full_spectrum_saturates_every_band() {
        let levels = BandLevels::from_magnitudes(&vec![1.0; 1024], 44100, 2048);
        assert!((levels.bass - 1.0).abs() < 1e-6);
        assert!((levels.mid - 1.0).abs() < 1e-6);
        assert!((levels.high - 1.0).abs() < 1e-6);
    }

    #[test]
    fn energy_lands_in_its_band() {
        // 44100 / 2048 = 21.5 Hz per bin, bin 5 is ~108 Hz
        let mut mags = vec![0.0; 1024];
        mags[5] = 1.0;
        let levels = BandLevels::from_magnitudes(&mags, 44100, 2048);
        assert!(levels.bass > 0.0);
        assert_eq!(levels.mid, 0.0);
        assert_eq!(levels.high, 0.0);
    }

    #[test]
    fn band_above_nyquist_is_empty() {
        // 8 kHz sample rate: Nyquist is 4 kHz, so the high band has no bins
        let levels = BandLevels::from_magnitudes(&vec![1.0; 128], 8000, 256);
        assert_eq!(levels.high, 0.0);
        assert!(levels.mid > 0.0);
    }
}
