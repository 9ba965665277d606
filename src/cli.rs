//! Interface de linha de comando do autodial baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, status, demo)
//! e flags globais (--config, --dry-run, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::actuator::Point;
use crate::config::Config;
use crate::player::AudioBackend;

/// autodial: disca uma lista de números, toca um áudio em cada chamada e registra o resultado.
#[derive(Debug, Parser)]
#[command(name = "autodial", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./autodial.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Não controla o desktop nem toca áudio; apenas registra as ações.
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa a lista de trabalho do início ao fim.
    Run {
        /// Arquivo JSON ou TOML com as linhas (padrão: `worklist` da configuração).
        worklist: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,

        /// Grava o registro completo da execução neste arquivo.
        #[arg(long)]
        transcript: Option<PathBuf>,
    },

    /// Mostra o status gravado de cada linha.
    Status {
        /// Arquivo JSON ou TOML com as linhas (padrão: `worklist` da configuração).
        worklist: Option<PathBuf>,
    },

    /// Executa três chamadas fictícias sem esperas.
    Demo,
}

/// Ajustes pontuais que substituem a configuração carregada.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Coordenada X do campo de discagem.
    #[arg(long)]
    pub dial_x: Option<i32>,

    /// Coordenada Y do campo de discagem.
    #[arg(long)]
    pub dial_y: Option<i32>,

    /// Coordenada X do botão de desligar.
    #[arg(long)]
    pub hang_x: Option<i32>,

    /// Coordenada Y do botão de desligar.
    #[arg(long)]
    pub hang_y: Option<i32>,

    /// Não clica em desligar ao fim da chamada.
    #[arg(long, default_value_t = false)]
    pub no_hangup: bool,

    /// Backend de áudio.
    #[arg(long, value_enum, ignore_case = true)]
    pub backend: Option<AudioBackend>,
}

impl Overrides {
    /// Aplica os valores informados sobre `config`.
    pub fn apply(&self, config: &mut Config) {
        config.dial_click = Point::new(
            self.dial_x.unwrap_or(config.dial_click.x),
            self.dial_y.unwrap_or(config.dial_click.y),
        );
        config.hang_click = Point::new(
            self.hang_x.unwrap_or(config.hang_click.x),
            self.hang_y.unwrap_or(config.hang_click.y),
        );
        if self.no_hangup {
            config.auto_hangup = false;
        }
        if let Some(backend) = self.backend {
            config.audio_backend = backend;
        }
    }
}
