//! Configuração do autodial carregada a partir de `autodial.toml`.
//!
//! A struct [`Config`] contém todos os parâmetros de uma execução.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `AUTODIAL_AUDIO_BACKEND` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::actuator::Point;
use crate::player::AudioBackend;

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "autodial.toml";

/// Variável de ambiente que substitui o backend de áudio.
pub const BACKEND_ENV: &str = "AUTODIAL_AUDIO_BACKEND";

/// Parâmetros de uma execução. Imutável enquanto a execução está ativa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Coordenada do campo de discagem.
    #[serde(default)]
    pub dial_click: Point,

    /// Coordenada do botão de desligar.
    #[serde(default)]
    pub hang_click: Point,

    /// Clica em desligar depois do tempo de chamada.
    #[serde(default = "default_auto_hangup")]
    pub auto_hangup: bool,

    /// Backend usado para tocar os áudios.
    #[serde(default)]
    pub audio_backend: AudioBackend,

    /// Espera após discar, em segundos.
    #[serde(
        rename = "wait_after_dial_s",
        default = "default_wait_after_dial",
        deserialize_with = "secs::deserialize",
        serialize_with = "secs::serialize"
    )]
    pub wait_after_dial: Duration,

    /// Espera antes de tocar o áudio, em segundos.
    #[serde(
        rename = "wait_before_audio_s",
        default = "default_wait_before_audio",
        deserialize_with = "secs::deserialize",
        serialize_with = "secs::serialize"
    )]
    pub wait_before_audio: Duration,

    /// Duração fixa da chamada após o áudio, em segundos.
    #[serde(
        rename = "call_timeout_s",
        default = "default_call_timeout",
        deserialize_with = "secs::deserialize",
        serialize_with = "secs::serialize"
    )]
    pub call_timeout: Duration,

    /// Pausa entre um item e o próximo, em segundos.
    #[serde(
        rename = "loop_delay_s",
        default = "default_loop_delay",
        deserialize_with = "secs::deserialize",
        serialize_with = "secs::serialize"
    )]
    pub loop_delay: Duration,

    /// Lista de trabalho padrão quando nenhuma é passada na CLI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worklist: Option<PathBuf>,
}

// Valor padrão: desligar automaticamente.
fn default_auto_hangup() -> bool {
    true
}

// Valor padrão: 2s após discar.
fn default_wait_after_dial() -> Duration {
    Duration::from_secs(2)
}

// Valor padrão: 1s antes do áudio.
fn default_wait_before_audio() -> Duration {
    Duration::from_secs(1)
}

// Valor padrão: 30s de chamada.
fn default_call_timeout() -> Duration {
    Duration::from_secs(30)
}

// Valor padrão: 1,5s entre itens.
fn default_loop_delay() -> Duration {
    Duration::from_millis(1500)
}

// Durações são escritas em segundos fracionários; negativos são rejeitados.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration {secs}: {e}")))
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dial_click: Point::default(),
            hang_click: Point::default(),
            auto_hangup: default_auto_hangup(),
            audio_backend: AudioBackend::default(),
            wait_after_dial: default_wait_after_dial(),
            wait_before_audio: default_wait_before_audio(),
            call_timeout: default_call_timeout(),
            loop_delay: default_loop_delay(),
            worklist: None,
        }
    }
}

impl Config {
    /// Carrega `autodial.toml` do diretório atual, ou `path` quando informado.
    /// Usa valores padrão se o arquivo padrão não existir; um `path` explícito
    /// precisa existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };

        // Variável de ambiente tem precedência sobre o arquivo para o backend.
        if let Ok(value) = std::env::var(BACKEND_ENV) {
            if !value.is_empty() {
                config.audio_backend = value
                    .parse::<AudioBackend>()
                    .with_context(|| format!("invalid {BACKEND_ENV}"))?;
            }
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Configuração sem esperas, usada pelo modo de demonstração.
    pub fn instant() -> Self {
        Self {
            wait_after_dial: Duration::ZERO,
            wait_before_audio: Duration::ZERO,
            call_timeout: Duration::ZERO,
            loop_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert!(config.auto_hangup);
        assert_eq!(config.audio_backend, AudioBackend::Vlc);
        assert_eq!(config.wait_after_dial, Duration::from_secs(2));
        assert_eq!(config.wait_before_audio, Duration::from_secs(1));
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.loop_delay, Duration::from_millis(1500));
        assert_eq!(config.dial_click, Point::new(0, 0));
        assert!(config.worklist.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            auto_hangup = false
            audio_backend = "ffplay"
            call_timeout_s = 12.5

            [dial_click]
            x = 100
            y = 200
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(!config.auto_hangup);
        assert_eq!(config.audio_backend, AudioBackend::Ffplay);
        assert_eq!(config.call_timeout, Duration::from_millis(12_500));
        assert_eq!(config.dial_click, Point::new(100, 200));
        assert_eq!(config.hang_click, Point::default());
        assert_eq!(config.loop_delay, Duration::from_millis(1500));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let err = toml::from_str::<Config>("loop_delay_s = -1.0").unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(toml::from_str::<Config>(r#"audio_backend = "winsound""#).is_err());
    }

    #[test]
    fn backend_in_file_is_case_insensitive() {
        let config: Config = toml::from_str(r#"audio_backend = "VLC""#).unwrap();
        assert_eq!(config.audio_backend, AudioBackend::Vlc);
        let config: Config = toml::from_str(r#"audio_backend = "FFplay""#).unwrap();
        assert_eq!(config.audio_backend, AudioBackend::Ffplay);
    }

    #[test]
    fn serialized_config_reads_back() {
        let config = Config {
            wait_after_dial: Duration::from_millis(250),
            ..Config::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("wait_after_dial_s = 0.25"));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn load_reads_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "loop_delay_s = 0.0\n[hang_click]\nx = 5\ny = 6").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.loop_delay, Duration::ZERO);
        assert_eq!(config.hang_click, Point::new(5, 6));
    }

    #[test]
    fn load_fails_for_missing_explicit_path() {
        assert!(Config::load(Some(Path::new("/nonexistent/autodial.toml"))).is_err());
    }

    #[test]
    fn instant_has_no_waits() {
        let config = Config::instant();
        assert_eq!(config.call_timeout, Duration::ZERO);
        assert!(config.auto_hangup);
    }
}
