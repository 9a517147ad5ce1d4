use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use serde::Serialize;
use tracing::info;

use crate::{error::Result, sampler::TimingSample, util::format_g};

/// Append-only sink for the per-iteration and per-layer report lines.
pub struct Report<W: Write> {
    writer: W,
}

impl Report<io::Stdout> {
    pub fn stdout() -> Report<io::Stdout> {
        Report::new(io::stdout())
    }
}

impl<W: Write> Report<W> {
    pub fn new(writer: W) -> Report<W> {
        Report { writer }
    }

    pub fn round(&mut self, prefix: &str, layer: &str, sample: &TimingSample) -> Result<()> {
        writeln!(
            self.writer,
            "{}/{}[Round{}]: {} us",
            prefix,
            layer,
            sample.iteration,
            format_g(sample.microseconds)
        )?;
        Ok(())
    }

    pub fn time(&mut self, prefix: &str, layer: &str, average_microseconds: f64) -> Result<()> {
        writeln!(
            self.writer,
            "{}/{}[Time]: {} us",
            prefix,
            layer,
            format_g(average_microseconds)
        )?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn error(&mut self, prefix: &str, layer: &str, message: &str) -> Result<()> {
        writeln!(self.writer, "{}/{}[Error]: {}", prefix, layer, message)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Writes `value` as pretty JSON to `path`.
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!("wrote results to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(report: Report<Vec<u8>>) -> Vec<String> {
        String::from_utf8(report.into_inner())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn line_formats() {
        let mut report = Report::new(Vec::new());
        let sample = TimingSample {
            iteration: 3,
            microseconds: 12.25,
        };

        report.round("resnet", "conv_a", &sample).unwrap();
        report.time("resnet", "conv_a", 1234.5678).unwrap();
        report.error("resnet", "conv_b", "boom").unwrap();

        assert_eq!(
            lines(report),
            vec![
                "resnet/conv_a[Round3]: 12.25 us",
                "resnet/conv_a[Time]: 1234.57 us",
                "resnet/conv_b[Error]: boom",
            ]
        );
    }
}
