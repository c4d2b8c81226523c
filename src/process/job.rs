use std::fs;
use std::io::{self, Write};
use std::path::Path;

use log::{debug, info, warn};
use thiserror::Error;

use super::average::ScanAverager;
use super::filter::ScanFilterEngine;
use super::progress::{CancellationToken, ProgressSink, Step};
use super::settings::{AverageSettings, FilterSettings, SettingsError};
use crate::io::mzxml::{MzXMLParserError, MzXMLReader, MzXMLWriter, MzXMLWriterError};
use crate::io::{ScanAccessError, ScanSource};
use crate::spectrum::Scan;

/// The reasons a job can fail. Cancellation is not among them, see [`JobOutcome::Cancelled`].
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("Failed to open the source: {0}")]
    OpenSource(#[from] MzXMLParserError),
    #[error("Failed to read from the source: {0}")]
    SourceRead(#[from] ScanAccessError),
    #[error("Failed to write the output: {0}")]
    Write(#[from] MzXMLWriterError),
    #[error("An IO error occurred: {0}")]
    IOError(#[from] io::Error),
}

/// How a job ended
#[derive(Debug)]
pub enum JobOutcome {
    /// The output was written in full. `notices` lists the anomalies that were skipped over.
    Completed { notices: Vec<String> },
    /// The job stopped early and its partial output was removed
    Cancelled,
    /// The job failed and its partial output was removed
    Failed(JobError),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn notices(&self) -> &[String] {
        match self {
            Self::Completed { notices } => notices,
            _ => &[],
        }
    }
}

fn time_range<'a, I: IntoIterator<Item = &'a Scan>>(scans: I) -> (Option<String>, Option<String>) {
    let mut scans = scans.into_iter();
    let first = scans.next();
    let last = scans.last().or(first);
    (
        first.and_then(|s| s.header.retention_time.clone()),
        last.and_then(|s| s.header.retention_time.clone()),
    )
}

/// Select scans from `source` with `engine` and write them to `writer`, returning
/// the number of scans written.
pub fn filter_run<S: ScanSource + ?Sized, W: Write>(
    source: &mut S,
    engine: &ScanFilterEngine,
    writer: &mut MzXMLWriter<W>,
    token: &CancellationToken,
    progress: &mut dyn ProgressSink,
    notices: &mut Vec<String>,
) -> Result<Step<usize>, JobError> {
    progress.set_stage_label("Task 1 of 2: Selecting scans");
    let kept = proceed!(engine.select(source, token, progress, notices)?);
    info!("Selected {} scans", kept.len());

    progress.set_stage_label("Task 2 of 2: Writing scans");
    progress.set_maximum(Some(kept.len()));
    let first = match kept.first() {
        Some(id) => source.header(*id)?,
        None => None,
    };
    let last = match kept.last() {
        Some(id) => source.header(*id)?,
        None => None,
    };
    writer.set_scan_count(kept.len());
    writer.set_time_range(
        first.and_then(|h| h.retention_time),
        last.and_then(|h| h.retention_time),
    );
    for id in kept.iter().copied() {
        bail_if_cancelled!(token);
        progress.advance(&format!("Scan {id}"));
        let scan = source.require_scan(id)?;
        writer.write_scan(&scan)?;
    }
    writer.close()?;
    Ok(Step::Done(kept.len()))
}

/// Average the redundant scans of `source` with `averager` and write the result to
/// `writer`, returning the number of scans written.
pub fn average_run<S: ScanSource + ?Sized, W: Write>(
    source: &mut S,
    averager: &ScanAverager,
    writer: &mut MzXMLWriter<W>,
    token: &CancellationToken,
    progress: &mut dyn ProgressSink,
    notices: &mut Vec<String>,
) -> Result<Step<usize>, JobError> {
    progress.set_stage_label("Task 1 of 4: Collecting scans");
    let index = proceed!(averager.collect(source, token, progress, notices)?);

    progress.set_stage_label("Task 2 of 4: Finding redundant scans");
    let groups = proceed!(averager.find_redundant(&index, token, progress)?);

    progress.set_stage_label("Task 3 of 4: Averaging scans");
    let scans = proceed!(averager.average(source, &index, &groups, token, progress)?);
    info!(
        "Averaged {} MS1 scans and {} groups into {} scans",
        index.len(),
        groups.len(),
        scans.len()
    );

    progress.set_stage_label("Task 4 of 4: Writing scans");
    progress.set_maximum(Some(scans.len()));
    let (start_time, end_time) = time_range(&scans);
    writer.set_scan_count(scans.len());
    writer.set_time_range(start_time, end_time);
    for scan in scans.iter() {
        bail_if_cancelled!(token);
        progress.advance(&format!("Scan {}", scan.num()));
        writer.write_scan(scan)?;
    }
    writer.close()?;
    Ok(Step::Done(scans.len()))
}

fn remove_partial_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) => warn!("Failed to remove partial output {}: {e}", path.display()),
    }
}

/// Run `job` against a new file at `path`, deleting the file unless the job completes
fn write_destination<F>(path: &Path, job: F) -> Result<Step<usize>, JobError>
where
    F: FnOnce(&mut MzXMLWriter<fs::File>) -> Result<Step<usize>, JobError>,
{
    let handle = fs::File::create(path)?;
    let mut writer = MzXMLWriter::new(handle);
    let result = match job(&mut writer) {
        Ok(Step::Done(count)) => writer
            .into_inner()
            .map(|_| Step::Done(count))
            .map_err(JobError::from),
        other => {
            drop(writer);
            other
        }
    };
    if !matches!(result, Ok(Step::Done(_))) {
        remove_partial_output(path);
    }
    result
}

fn finish(
    result: Result<Step<usize>, JobError>,
    notices: Vec<String>,
    progress: &mut dyn ProgressSink,
) -> JobOutcome {
    match result {
        Ok(Step::Done(count)) => {
            info!("Wrote {count} scans");
            for notice in notices.iter() {
                progress.report_notice(notice);
            }
            progress.signal_completion(true);
            JobOutcome::Completed { notices }
        }
        Ok(Step::Cancelled) => {
            progress.signal_completion(false);
            JobOutcome::Cancelled
        }
        Err(e) => {
            progress.signal_fatal_error(&e);
            progress.signal_completion(false);
            JobOutcome::Failed(e)
        }
    }
}

/// Filter the scans of the mzXML file named by `settings` into its destination file
pub fn run_filter_job(
    settings: &FilterSettings,
    token: &CancellationToken,
    progress: &mut dyn ProgressSink,
) -> JobOutcome {
    let mut notices = Vec::new();
    let result = filter_job(settings, token, progress, &mut notices);
    finish(result, notices, progress)
}

fn filter_job(
    settings: &FilterSettings,
    token: &CancellationToken,
    progress: &mut dyn ProgressSink,
    notices: &mut Vec<String>,
) -> Result<Step<usize>, JobError> {
    settings.validate()?;
    let mut source = MzXMLReader::open_path(&settings.job.source_path)?;
    let engine = ScanFilterEngine::from_settings(settings);
    write_destination(&settings.job.destination_path, |writer| {
        filter_run(&mut source, &engine, writer, token, progress, notices)
    })
}

/// Average the redundant scans of the mzXML file named by `settings` into its destination file
pub fn run_average_job(
    settings: &AverageSettings,
    token: &CancellationToken,
    progress: &mut dyn ProgressSink,
) -> JobOutcome {
    let mut notices = Vec::new();
    let result = average_job(settings, token, progress, &mut notices);
    finish(result, notices, progress)
}

fn average_job(
    settings: &AverageSettings,
    token: &CancellationToken,
    progress: &mut dyn ProgressSink,
    notices: &mut Vec<String>,
) -> Result<Step<usize>, JobError> {
    settings.validate()?;
    let mut source = MzXMLReader::open_path(&settings.job.source_path)?;
    let averager = ScanAverager::new(settings.job.tolerance());
    write_destination(&settings.job.destination_path, |writer| {
        average_run(&mut source, &averager, writer, token, progress, notices)
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::MemoryScanSource;
    use crate::peaks::PeakList;
    use crate::process::progress::test::CancelOnAdvance;
    use crate::process::settings::JobSettings;
    use crate::process::NullProgress;
    use crate::spectrum::{Precursor, ScanHeader};

    fn ms1(num: u32) -> Scan {
        let mut header = ScanHeader::new(num, 1);
        header.centroided = Some(true);
        header.retention_time = Some(format!("PT{num}.0S"));
        Scan::new(header, PeakList::new(vec![450.0, 500.0], vec![100.0, 300.0]))
    }

    fn ms2(num: u32, parent: u32, mz: f64, peaks: Vec<(f64, f64)>) -> Scan {
        let mut header = ScanHeader::new(num, 2);
        header.centroided = Some(true);
        header.retention_time = Some(format!("PT{num}.0S"));
        header.precursor = Some(
            Precursor::new(mz, Some(1000.0), Some(2))
                .with_activation_method("CID")
                .with_scan_num(parent),
        );
        Scan::new(header, PeakList::from_pairs(peaks))
    }

    fn write_source(path: &Path, scans: Vec<Scan>) -> io::Result<()> {
        let mut writer = MzXMLWriter::new(fs::File::create(path)?);
        writer.set_scan_count(scans.len());
        for scan in scans.iter() {
            writer.write_scan(scan)?;
        }
        writer.close()?;
        writer.into_inner()?;
        Ok(())
    }

    fn job_settings(dir: &Path) -> JobSettings {
        JobSettings::new(dir.join("source.mzXML"), dir.join("output.mzXML"))
    }

    #[test_log::test]
    fn test_filter_job() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = job_settings(dir.path());
        write_source(
            &settings.source_path,
            vec![
                ms1(1),
                ms2(2, 1, 500.0, vec![(120.0, 100.0), (500.2, 80.0)]),
                ms2(3, 1, 500.0, vec![(120.0, 100.0), (499.9, 5.0)]),
            ],
        )?;
        let filter = FilterSettings::new(settings.clone().with_accuracy(0.5, false), 500.0)
            .with_cutoff(10.0, true);

        let outcome = run_filter_job(&filter, &CancellationToken::new(), &mut NullProgress);
        assert!(outcome.is_completed(), "{outcome:?}");
        assert!(outcome.notices().is_empty());

        let mut output = MzXMLReader::open_path(&settings.destination_path)?;
        assert_eq!(output.len(), 1);
        let scan = output.require_scan(1)?;
        assert_eq!(scan.peaks.mzs(), &[120.0, 500.2f32 as f64]);
        assert_eq!(scan.header.retention_time.as_deref(), Some("PT2.0S"));
        // The parent was not written, so the reference is dropped
        assert_eq!(scan.header.precursor_scan_num(), None);
        assert_eq!(output.start_time.as_deref(), Some("PT2.0S"));
        assert_eq!(output.end_time.as_deref(), Some("PT2.0S"));

        let with_parent = filter.with_parent_scan(true);
        let outcome = run_filter_job(&with_parent, &CancellationToken::new(), &mut NullProgress);
        assert!(outcome.is_completed());
        let mut output = MzXMLReader::open_path(&settings.destination_path)?;
        assert_eq!(output.len(), 2);
        assert_eq!(output.require_scan(2)?.header.precursor_scan_num(), Some(1));
        Ok(())
    }

    #[test_log::test]
    fn test_average_job() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = job_settings(dir.path()).with_accuracy(0.05, false);
        write_source(
            &settings.source_path,
            vec![
                ms1(1),
                ms2(2, 1, 445.12, vec![(200.0, 10.0)]),
                ms1(3),
                ms2(4, 3, 445.14, vec![(200.0, 30.0)]),
            ],
        )?;

        let outcome = run_average_job(
            &AverageSettings::new(settings.clone()),
            &CancellationToken::new(),
            &mut NullProgress,
        );
        assert!(outcome.is_completed(), "{outcome:?}");

        let mut output = MzXMLReader::open_path(&settings.destination_path)?;
        assert_eq!(output.len(), 2);
        let parent = output.require_scan(1)?;
        assert_eq!(parent.ms_level(), 1);
        assert_eq!(parent.peaks.intensities(), &[100.0, 300.0]);
        let child = output.require_scan(2)?;
        assert_eq!(child.header.precursor_scan_num(), Some(1));
        assert_eq!(child.peaks.mzs(), &[200.0]);
        assert_eq!(child.peaks.intensities(), &[20.0]);
        assert_eq!(output.start_time.as_deref(), Some("PT1.0S"));
        assert_eq!(output.end_time.as_deref(), Some("PT2.0S"));
        Ok(())
    }

    #[test]
    fn test_cancelled_job_removes_output() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = job_settings(dir.path());
        write_source(&settings.source_path, vec![ms1(1), ms2(2, 1, 500.0, vec![(500.0, 1.0)])])?;
        let token = CancellationToken::new();
        token.cancel();

        let outcome = run_average_job(&AverageSettings::new(settings.clone()), &token, &mut NullProgress);
        assert!(matches!(outcome, JobOutcome::Cancelled));
        assert!(!settings.destination_path.exists());

        let filter = FilterSettings::new(settings.clone(), 500.0);
        let outcome = run_filter_job(&filter, &token, &mut NullProgress);
        assert!(matches!(outcome, JobOutcome::Cancelled));
        assert!(!settings.destination_path.exists());
        Ok(())
    }

    #[test]
    fn test_write_failure_removes_output() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("output.mzXML");
        let result = write_destination(&path, |writer| {
            writer.write_scan(&ms1(1))?;
            assert!(path.exists());
            writer.close()?;
            writer.write_scan(&ms1(2))?;
            Ok(Step::Done(2))
        });
        assert!(matches!(
            result,
            Err(JobError::Write(MzXMLWriterError::InvalidActionError(_)))
        ));
        assert!(!path.exists());

        let result = write_destination(&path, |writer| {
            writer.write_scan(&ms1(1))?;
            Err(JobError::SourceRead(ScanAccessError::ScanNotFound(2)))
        });
        assert!(matches!(result, Err(JobError::SourceRead(_))));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_cancelled_while_writing() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = job_settings(dir.path());
        write_source(
            &settings.source_path,
            vec![
                ms1(1),
                ms2(2, 1, 500.0, vec![(500.0, 10.0)]),
                ms2(3, 1, 500.0, vec![(500.1, 10.0)]),
            ],
        )?;
        let filter = FilterSettings::new(settings.clone(), 500.0).with_parent_scan(true);

        // three advances while selecting, the fourth comes with the first scan written
        let token = CancellationToken::new();
        let mut progress = CancelOnAdvance::new(&token, 4);
        let outcome = run_filter_job(&filter, &token, &mut progress);
        assert!(matches!(outcome, JobOutcome::Cancelled));
        assert_eq!(progress.advances, 4);
        assert!(!settings.destination_path.exists());
        Ok(())
    }

    #[test]
    fn test_failed_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let settings = job_settings(dir.path());
        let outcome = run_average_job(
            &AverageSettings::new(settings.clone()),
            &CancellationToken::new(),
            &mut NullProgress,
        );
        assert!(matches!(outcome, JobOutcome::Failed(JobError::OpenSource(_))));
        assert!(!settings.destination_path.exists());

        let invalid = FilterSettings::new(settings, f64::NAN);
        let outcome = run_filter_job(&invalid, &CancellationToken::new(), &mut NullProgress);
        assert!(matches!(
            outcome,
            JobOutcome::Failed(JobError::Settings(SettingsError::InvalidTargetMz(_)))
        ));
    }

    #[test]
    fn test_in_memory_runs() {
        let mut source = MemoryScanSource::new(vec![
            ms1(1),
            ms2(2, 1, 500.0, vec![(500.0, 50.0)]),
            ms2(3, 1, 700.0, vec![(700.0, 50.0)]),
        ]);
        let token = CancellationToken::new();
        let mut notices = Vec::new();

        let mut writer = MzXMLWriter::new(Vec::new());
        let engine = ScanFilterEngine::new(700.0, Default::default());
        let written = filter_run(&mut source, &engine, &mut writer, &token, &mut NullProgress, &mut notices)
            .unwrap();
        assert_eq!(written, Step::Done(1));
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(text.contains("<msRun scanCount=\"1\" startTime=\"PT3.0S\" endTime=\"PT3.0S\">"));

        let mut writer = MzXMLWriter::new(Vec::new());
        let written = average_run(
            &mut source,
            &ScanAverager::new(Default::default()),
            &mut writer,
            &token,
            &mut NullProgress,
            &mut notices,
        )
        .unwrap();
        assert_eq!(written, Step::Done(3));

        let mut empty = MemoryScanSource::default();
        let mut writer = MzXMLWriter::new(Vec::new());
        let written = average_run(
            &mut empty,
            &ScanAverager::new(Default::default()),
            &mut writer,
            &token,
            &mut NullProgress,
            &mut notices,
        )
        .unwrap();
        assert_eq!(written, Step::Done(0));
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(!text.contains("<index"));
    }
}
