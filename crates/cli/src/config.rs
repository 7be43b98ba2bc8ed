use std::path::PathBuf;
use std::time::Duration;

use clap::builder::{BoolishValueParser, RangedU64ValueParser};
use clap::{ArgAction, Parser};
use discmeta_metadata::{HeuristicConfig, LlmConfig, LlmProvider};
use discmeta_scanner::ProbeConfig;

/// Classify a ripped disc and write its metadata record.
#[derive(Parser, Debug, Clone)]
#[command(name = "discmeta")]
#[command(version)]
pub struct ScanConfig {
    /// Disc directory holding tech/, mkv/ and meta/
    #[arg(env = "DISC_DIR")]
    pub disc_dir: PathBuf,

    #[arg(long, env = "MKVMERGE_BIN", default_value = "mkvmerge")]
    pub mkvmerge_bin: PathBuf,

    #[arg(long, env = "FFPROBE_BIN", default_value = "ffprobe")]
    pub ffprobe_bin: PathBuf,

    /// Last-resort probe tool; an empty value disables it
    #[arg(long, env = "MEDIAINFO_BIN", default_value = "mediainfo")]
    pub mediainfo_bin: String,

    /// Limit for each probe tool invocation
    #[arg(
        long,
        env = "PROBE_TIMEOUT_SEC",
        default_value_t = 120,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub probe_timeout_sec: u64,

    #[arg(
        long,
        env = "RUNTIME_TOLERANCE_SEC",
        default_value_t = 120.0,
        value_parser = positive_number
    )]
    pub runtime_tolerance_sec: f64,

    /// Minimum titles sharing a runtime bucket to count as episodes
    #[arg(
        long,
        env = "EPISODE_GROUP_MIN",
        default_value_t = 2,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub episode_group_min: usize,

    /// Minimum runtime of a main feature
    #[arg(
        long,
        env = "MAIN_FEATURE_MINUTES",
        default_value_t = 60.0,
        value_parser = positive_number
    )]
    pub main_feature_minutes: f64,

    /// Ask the LLM for an arbitration (`--llm-enable false` stays offline)
    #[arg(
        long,
        env = "LLM_ENABLE",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub llm_enable: bool,

    /// ollama or openai
    #[arg(long, env = "LLM_PROVIDER", default_value = "ollama")]
    pub llm_provider: LlmProvider,

    #[arg(long, env = "LLM_MODEL", default_value = "qwen2.5:14b-instruct-q4_K_M")]
    pub llm_model: String,

    #[arg(long, env = "LLM_ENDPOINT", default_value = "http://127.0.0.1:11434")]
    pub llm_endpoint: String,

    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[arg(
        long,
        env = "LLM_TIMEOUT_SEC",
        default_value_t = 3600,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub llm_timeout_sec: u64,

    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.2)]
    pub llm_temperature: f64,

    /// Recorded in the artifact's provenance block
    #[arg(long, env = "ARCHIVE_LAYOUT_VERSION", default_value = "2.0")]
    pub layout_version: String,
}

fn positive_number(raw: &str) -> Result<f64, String> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        _ => Err(format!("'{raw}' is not a positive number")),
    }
}

impl ScanConfig {
    pub fn probe_config(&self) -> ProbeConfig {
        let mediainfo = self.mediainfo_bin.trim();
        ProbeConfig {
            mkvmerge_bin: self.mkvmerge_bin.clone(),
            ffprobe_bin: self.ffprobe_bin.clone(),
            mediainfo_bin: (!mediainfo.is_empty()).then(|| PathBuf::from(mediainfo)),
            timeout: Duration::from_secs(self.probe_timeout_sec),
        }
    }

    pub fn heuristic_config(&self) -> HeuristicConfig {
        HeuristicConfig {
            runtime_tolerance_seconds: self.runtime_tolerance_sec,
            episode_group_min: self.episode_group_min,
            main_feature_minutes: self.main_feature_minutes,
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            provider: self.llm_provider,
            model: self.llm_model.clone(),
            endpoint: self.llm_endpoint.clone(),
            api_key: self.llm_api_key.clone().filter(|k| !k.trim().is_empty()),
            timeout: Duration::from_secs(self.llm_timeout_sec),
            temperature: self.llm_temperature,
        }
    }
}
