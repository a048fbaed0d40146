use plotly::common::{DashType, Line, Mode, Orientation};
use plotly::layout::{Axis, Layout};
use plotly::{Bar, Plot, Scatter};

use crate::evaluation::EvaluationReport;
use crate::explain::{DependenceCurve, ImportanceTable};
use crate::models::TrainingHistory;

const PALETTE: [&str; 8] = [
    "aqua",
    "darkorange",
    "cornflowerblue",
    "darkgreen",
    "darkred",
    "purple",
    "gold",
    "lime",
];

fn class_label(class: usize, class_names: &[String]) -> String {
    match class_names.get(class) {
        Some(name) => format!("Class {} ({})", class, name),
        None => format!("Class {}", class),
    }
}

/// One-vs-rest ROC curve per class with the chance diagonal.
pub fn plot_roc_curves(report: &EvaluationReport, class_names: &[String], title: &str) -> Plot {
    let mut plot = Plot::new();
    for m in &report.per_class {
        let Some(auc) = m.roc.auc else {
            continue;
        };
        plot.add_trace(
            Scatter::new(m.roc.fpr.clone(), m.roc.tpr.clone())
                .mode(Mode::Lines)
                .name(&format!("{} (area = {:.2})", class_label(m.class, class_names), auc))
                .line(Line::new().color(PALETTE[m.class % PALETTE.len()]).width(2.0)),
        );
    }
    plot.add_trace(
        Scatter::new(vec![0.0, 1.0], vec![0.0, 1.0])
            .mode(Mode::Lines)
            .name("Chance")
            .line(Line::new().color("black").dash(DashType::Dash)),
    );
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("False Positive Rate").range(vec![0.0, 1.0]))
            .y_axis(Axis::new().title("True Positive Rate").range(vec![0.0, 1.05])),
    );
    plot
}

/// Horizontal bars of the `top_n` most important features, largest on top.
pub fn plot_feature_importance(table: &ImportanceTable, top_n: usize) -> Plot {
    let top = table.top_k(top_n);
    let names: Vec<String> = top.iter().rev().map(|e| e.feature.clone()).collect();
    let means: Vec<f64> = top.iter().rev().map(|e| e.mean).collect();

    let mut plot = Plot::new();
    plot.add_trace(
        Bar::new(means, names)
            .orientation(Orientation::Horizontal)
            .name("Mean accuracy drop"),
    );
    plot.set_layout(
        Layout::new()
            .title("Permutation Importance")
            .x_axis(Axis::new().title("Mean decrease in accuracy"))
            .height(300 + 20 * top.len()),
    );
    plot
}

/// Mean predicted probability of every class across the sweep.
///
/// Uses raw column units on the x axis when the curve carries them.
pub fn plot_partial_dependence(curve: &DependenceCurve, class_names: &[String]) -> Plot {
    let (xs, x_title) = match &curve.raw_grid {
        Some(raw) => (raw.clone(), curve.feature.trim_start_matches("num__").to_string()),
        None => (curve.grid.clone(), format!("{} (standardized)", curve.feature)),
    };

    let mut plot = Plot::new();
    for (class, column) in curve.mean_proba.columns().into_iter().enumerate() {
        plot.add_trace(
            Scatter::new(xs.clone(), column.to_vec())
                .mode(Mode::Lines)
                .name(&class_label(class, class_names))
                .line(Line::new().color(PALETTE[class % PALETTE.len()])),
        );
    }
    plot.set_layout(
        Layout::new()
            .title(format!("Partial Dependence of {}", curve.feature).as_str())
            .x_axis(Axis::new().title(x_title.as_str()))
            .y_axis(Axis::new().title("Mean predicted probability")),
    );
    plot
}

pub fn plot_losses(history: &TrainingHistory) -> Plot {
    let epochs: Vec<f64> = history.epochs.iter().map(|m| m.epoch as f64).collect();
    let train: Vec<f64> = history.epochs.iter().map(|m| m.train_loss).collect();
    let val: Vec<f64> = history.epochs.iter().map(|m| m.val_loss).collect();

    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(epochs.clone(), train)
            .name("Train Loss")
            .mode(Mode::Lines)
            .line(Line::new().color("rgba(31, 119, 180, 1.0)")),
    );
    plot.add_trace(
        Scatter::new(epochs, val)
            .name("Val Loss")
            .mode(Mode::Lines)
            .line(Line::new().color("rgba(255, 127, 14, 1.0)")),
    );
    if let Some(best) = history.best() {
        plot.add_trace(
            Scatter::new(vec![best.epoch as f64], vec![best.val_loss])
                .name("Restored")
                .mode(Mode::Markers),
        );
    }
    plot.set_layout(
        Layout::new()
            .title("Training and Validation Loss Over Epochs")
            .x_axis(Axis::new().title("Epoch"))
            .y_axis(Axis::new().title("Loss")),
    );
    plot
}
