use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use maud::html;
use plotly::Plot;

use ancillary_classifiers::evaluation::{evaluate, EvaluationReport, Split};
use ancillary_classifiers::io::artifacts;
use ancillary_classifiers::io::bookings::read_bookings;
use ancillary_classifiers::models::ProbabilisticClassifier;
use ancillary_classifiers::pipeline::{Pipeline, PipelineOutcome};
use ancillary_classifiers::report::plots::{
    plot_feature_importance, plot_losses, plot_partial_dependence, plot_roc_curves,
};

use crate::input::{EvaluateConfig, RunConfig};
use crate::report::{Report, ReportSection};

const REPORT_FILE: &str = "nn_report.html";

fn write_plot(plot: &Plot, path: PathBuf) -> Result<PathBuf> {
    fs::write(&path, plot.to_html())
        .with_context(|| format!("Failed to write plot: {}", path.display()))?;
    Ok(path)
}

/// Full batch run: load bookings, train, evaluate, explain, persist.
pub fn run_pipeline(config: &RunConfig) -> Result<PipelineOutcome> {
    let start_time = Instant::now();
    let out_dir = Path::new(&config.output_dir);

    let dataset = read_bookings(&config.data, &config.pipeline.schema)?;
    let outcome = Pipeline::new(config.pipeline.clone())
        .run(&dataset)
        .context("Pipeline run failed")?;
    log::info!("Pipeline completed in {:?}", start_time.elapsed());

    let written = artifacts::write_outcome(&outcome, out_dir)?;
    log::info!("Wrote {} artifacts to {}", written.len(), out_dir.display());

    let class_names: Vec<String> = outcome
        .classifier
        .labels()
        .class_names()
        .into_values()
        .collect();

    if config.plots {
        if let Some(report) = outcome.test_report() {
            write_plot(
                &plot_roc_curves(report, &class_names, "Receiver Operating Characteristic - Test Set"),
                out_dir.join("nn_roc.html"),
            )?;
        }
        if let Some(table) = &outcome.importance {
            write_plot(&plot_feature_importance(table, 20), out_dir.join("nn_feature_importance.html"))?;
        }
        for curve in outcome.dependence.iter().filter_map(|d| d.curve()) {
            let name = curve.feature.trim_start_matches("num__");
            write_plot(
                &plot_partial_dependence(curve, &class_names),
                out_dir.join(format!("nn_pdp_{}.html", name)),
            )?;
        }
        write_plot(&plot_losses(&outcome.history), out_dir.join("nn_loss.html"))?;
    }

    if config.report {
        let path = out_dir.join(REPORT_FILE);
        build_report(config, &outcome, &class_names)?.save_to_file(&path)?;
        log::info!("Report saved to {}", path.display());
    }

    Ok(outcome)
}

fn metrics_table(report: &EvaluationReport, class_names: &[String]) -> maud::Markup {
    html! {
        table {
            tr { th { "class" } th { "precision" } th { "recall" } th { "f1" } th { "support" } th { "auc" } }
            @for m in &report.per_class {
                tr {
                    td { (class_names.get(m.class).cloned().unwrap_or_else(|| m.class.to_string())) }
                    td { (format!("{:.4}", m.precision)) }
                    td { (format!("{:.4}", m.recall)) }
                    td { (format!("{:.4}", m.f1)) }
                    td { (m.support) }
                    td {
                        @match m.roc.auc {
                            Some(auc) => { (format!("{:.4}", auc)) }
                            None => { "-" }
                        }
                    }
                }
            }
        }
        p {
            "accuracy " (format!("{:.4}", report.accuracy))
            " | balanced accuracy " (format!("{:.4}", report.balanced_accuracy))
        }
    }
}

fn build_report(config: &RunConfig, outcome: &PipelineOutcome, class_names: &[String]) -> Result<Report> {
    let mut report = Report::new(
        "ancillary",
        clap::crate_version!(),
        "Ancillary Preference Classifier Report",
    );

    /* Section 1: Evaluation */
    {
        let mut section = ReportSection::new("Evaluation");
        for (split, eval) in &outcome.evaluation {
            section.add_content(html! { h3 { (split.to_string()) " split" } });
            section.add_content(metrics_table(eval, class_names));
        }
        if let Some(test) = outcome.test_report() {
            section.add_plot(plot_roc_curves(test, class_names, "ROC - Test Set"));
        }
        report.add_section(section);
    }

    /* Section 2: Training */
    {
        let mut section = ReportSection::new("Training");
        let best = outcome.history.best_epoch;
        section.add_content(html! {
            p {
                (outcome.history.epochs.len()) " epoch(s) run; weights restored from epoch " (best)
                @if outcome.history.stopped_early { " (early stopping fired)" }
            }
        });
        if let Some(resample) = &outcome.resample {
            section.add_content(html! {
                p { "Training rows per class before / after SMOTE:" }
                table {
                    tr { th { "class" } th { "before" } th { "after" } }
                    @for (class, before) in &resample.counts_before {
                        tr {
                            td { (*class) }
                            td { (*before) }
                            td { (resample.counts_after.get(class).copied().unwrap_or(0)) }
                        }
                    }
                }
                @for skipped in &resample.skipped {
                    p { "Class " (skipped.class) " not oversampled: " (skipped.reason) }
                }
            });
        }
        section.add_plot(plot_losses(&outcome.history));
        report.add_section(section);
    }

    /* Section 3: Interpretation */
    {
        let mut section = ReportSection::new("Interpretation");
        if let Some(table) = &outcome.importance {
            section.add_plot(plot_feature_importance(table, 20));
            for failure in &table.failures {
                section.add_content(html! { p { "Importance failed for " (failure.feature) ": " (failure.error) } });
            }
        }
        for dependence in &outcome.dependence {
            match dependence.curve() {
                Some(curve) => section.add_plot(plot_partial_dependence(curve, class_names)),
                None => section.add_content(html! { p { "Partial dependence failed for " (dependence.feature()) } }),
            }
        }
        report.add_section(section);
    }

    /* Section 4: Configuration */
    {
        let mut section = ReportSection::new("Configuration");
        section.add_content(html! {
            pre { code { (serde_json::to_string_pretty(config)?) } }
        });
        report.add_section(section);
    }

    Ok(report)
}

/// Re-evaluate a saved model on its saved test split.
pub fn run_evaluation(config: &EvaluateConfig) -> Result<EvaluationReport> {
    let model_path = config.artifacts_dir.join(artifacts::MODEL_FILE);
    let model = artifacts::load_model(&model_path)?;
    let (x_test, y_test) = artifacts::load_test_split(&config.artifacts_dir)?;
    log::info!(
        "Evaluating {} on {} test rows from {}",
        model.name(),
        x_test.nrows(),
        config.artifacts_dir.display()
    );

    let proba = model.predict_proba(&x_test)?;
    let report = evaluate(Split::Test, &y_test, &proba, model.n_classes())?;
    let class_names: Vec<String> = model.labels().class_names().into_values().collect();
    log::info!("\n{}", report.render_text(Some(&class_names)));

    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;
    artifacts::save_results(&report.results_row(config.headline_class)?, &config.output_dir)?;
    artifacts::save_roc(&report, &config.output_dir)?;
    Ok(report)
}
