//! Columnar export of a [`TimeSeries`].

use chrono::NaiveDate;
use polars::prelude::*;

use crate::{
    error::{QuoteError, Result},
    types::TimeSeries,
};

impl TimeSeries {
    /// Converts the series into a DataFrame.
    ///
    /// Columns: symbol, date, open, high, low, close, volume.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .ok_or_else(|| QuoteError::Other("Invalid epoch".to_string()))?;

        let bars = self.bars();
        let dates: Vec<i32> = bars
            .iter()
            .map(|bar| (bar.date() - epoch).num_days() as i32)
            .collect();
        let symbols: Vec<&str> = vec![self.symbol().as_str(); bars.len()];

        let date_col = Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| QuoteError::Other(e.to_string()))?;

        DataFrame::new(vec![
            Column::new("symbol".into(), symbols),
            date_col,
            Column::new("open".into(), bars.iter().map(|b| b.open).collect::<Vec<_>>()),
            Column::new("high".into(), bars.iter().map(|b| b.high).collect::<Vec<_>>()),
            Column::new("low".into(), bars.iter().map(|b| b.low).collect::<Vec<_>>()),
            Column::new("close".into(), bars.iter().map(|b| b.close).collect::<Vec<_>>()),
            Column::new("volume".into(), bars.iter().map(|b| b.volume).collect::<Vec<_>>()),
        ])
        .map_err(|e| QuoteError::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{PriceBar, Symbol, TimeSeries};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_to_dataframe() {
        let bars = vec![
            PriceBar::new(
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                1.0,
                2.0,
                0.5,
                1.5,
                100.0,
            ),
            PriceBar::new(
                Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
                1.5,
                2.5,
                1.0,
                2.0,
                200.0,
            ),
        ];
        let series = TimeSeries::new(Symbol::new("PETR4"), bars).unwrap();

        let df = series.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 7);
        let closes: Vec<Option<f64>> = df
            .column("close")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(closes, vec![Some(1.5), Some(2.0)]);
    }
}
