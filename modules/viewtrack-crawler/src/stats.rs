use std::time::Duration;

/// Stats from one crawl cycle.
#[derive(Debug, Default, Clone)]
pub struct CycleSummary {
    pub records_fetched: usize,
    pub invalid_links: usize,
    pub crawled: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub unavailable: usize,
    pub updated: usize,
    pub appended: usize,
    pub duplicates_removed: usize,
    pub duration: Duration,
}

impl std::fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let crawled = self.crawled.max(1);
        writeln!(f, "\n=== Crawl Cycle Complete ===")?;
        writeln!(f, "Records fetched:    {}", self.records_fetched)?;
        writeln!(f, "Invalid links:      {}", self.invalid_links)?;
        writeln!(f, "Pages crawled:      {}", self.crawled)?;
        writeln!(
            f,
            "Succeeded:          {} ({:.0}%)",
            self.succeeded,
            self.succeeded as f64 / crawled as f64 * 100.0
        )?;
        writeln!(
            f,
            "Partial (fallback): {} ({:.0}%)",
            self.partial,
            self.partial as f64 / crawled as f64 * 100.0
        )?;
        writeln!(f, "Unavailable:        {}", self.unavailable)?;
        writeln!(f, "\nSheet writes:")?;
        writeln!(f, "  Updated:    {}", self.updated)?;
        writeln!(f, "  Appended:   {}", self.appended)?;
        writeln!(f, "  Dups swept: {}", self.duplicates_removed)?;
        let secs = self.duration.as_secs_f64();
        writeln!(f, "\nDuration: {:.1}s", secs)?;
        writeln!(
            f,
            "Throughput: {:.1} pages/min",
            self.crawled as f64 / secs.max(1.0) * 60.0
        )?;
        Ok(())
    }
}
