//! Interface de terminal do autodial: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso e `console` para
//! estilização com cores. O [`RunProgress`] recebe os eventos da execução
//! e os imprime acima da barra, na ordem em que chegam.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::events::{Event, EventKind, EventSink};
use crate::state_machine::{ItemStatus, RunOutcome, RunReport, WorkItem};

/// Indicador visual de progresso de uma execução no terminal.
///
/// Mensagens de erro aparecem em vermelho, desligamentos em verde e o
/// restante sem cor. A barra avança a cada item discado.
pub struct RunProgress {
    // Barra de progresso do indicatif.
    pb: ProgressBar,
    // Estilo verde para sucesso.
    green: Style,
    // Estilo vermelho para falhas.
    red: Style,
    // Estilo amarelo para cancelamento.
    yellow: Style,
    // Estilo esmaecido para o carimbo de tempo.
    dim: Style,
}

impl RunProgress {
    /// Cria a barra para `total` itens.
    pub fn new(total: usize) -> Self {
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    fn style_for(&self, kind: &EventKind) -> Option<&Style> {
        match kind {
            EventKind::ItemFailed { .. }
            | EventKind::RunAborted { .. }
            | EventKind::SaveFailed { .. } => Some(&self.red),
            EventKind::HungUp { .. } | EventKind::Saved { .. } => Some(&self.green),
            EventKind::RunCompleted {
                outcome: RunOutcome::Cancelled,
                ..
            } => Some(&self.yellow),
            _ => None,
        }
    }
}

impl EventSink for RunProgress {
    fn emit(&self, event: Event) {
        let stamp = format!("[{}]", event.at.format("%Y-%m-%d %H:%M:%S"));
        let text = event.kind.to_string();
        let text = match self.style_for(&event.kind) {
            Some(style) => style.apply_to(text).to_string(),
            None => text,
        };
        self.pb.println(format!("{} {text}", self.dim.apply_to(stamp)));

        match &event.kind {
            EventKind::Dialing { index, phone } => {
                self.pb.set_position(*index as u64 + 1);
                self.pb.set_message(format!("dialing {phone}"));
            }
            EventKind::Playing { .. } => self.pb.set_message("playing"),
            EventKind::RunCompleted { .. } => self.pb.finish_and_clear(),
            _ => {}
        }
    }
}

fn status_style(status: ItemStatus) -> Style {
    match status {
        ItemStatus::Done => Style::new().green(),
        ItemStatus::Failed => Style::new().red(),
        ItemStatus::Running => Style::new().yellow(),
        ItemStatus::Pending => Style::new(),
    }
}

/// Imprime a lista de trabalho com o status de cada linha.
pub fn print_items(items: &[WorkItem]) {
    for (i, item) in items.iter().enumerate() {
        let updated = item
            .last_updated
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:<18} {:<8} {:<19}  {}",
            i + 1,
            item.phone,
            status_style(item.status).apply_to(item.status),
            updated,
            item.audio_path
        );
    }
}

/// Imprime o relatório da execução formatado em JSON com estilo colorido.
pub fn print_report(report: &RunReport) {
    let style = match report.outcome {
        RunOutcome::Completed if report.failed == 0 => Style::new().green().bold(),
        RunOutcome::Completed | RunOutcome::Cancelled => Style::new().yellow().bold(),
        RunOutcome::Aborted(_) => Style::new().red().bold(),
    };
    println!();
    println!("{}", style.apply_to("─── Run Report ───"));
    println!(
        "{}",
        serde_json::to_string_pretty(report).unwrap_or_default()
    );
}
