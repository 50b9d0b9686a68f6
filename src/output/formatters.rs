use chrono::{DateTime, Utc};
use serde::Serialize;

/// One successful Read Holding Registers result, as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterReading {
    pub slave_address: u8,
    pub start: u16,
    pub values: Vec<u16>,
    pub timestamp: DateTime<Utc>,
}

impl RegisterReading {
    pub fn new(slave_address: u8, start: u16, values: Vec<u16>) -> Self {
        Self {
            slave_address,
            start,
            values,
            timestamp: Utc::now(),
        }
    }

    /// `(register address, value)` pairs.
    pub fn registers(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, &value)| (self.start as u32 + i as u32, value))
    }
}

pub trait DataFormatter: Send + Sync {
    fn format_reading(&self, reading: &RegisterReading) -> String;
    fn format_header(&self) -> String;

    fn format_readings(&self, readings: &[RegisterReading]) -> String {
        readings
            .iter()
            .map(|r| self.format_reading(r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_reading(&self, reading: &RegisterReading) -> String {
        let mut output = format!(
            "🔹 Slave {} @ {}\n",
            reading.slave_address,
            reading.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
        for (address, value) in reading.registers() {
            output.push_str(&format!("  [{:>3}] {:>5}  0x{:04X}\n", address, value, value));
        }
        output
    }

    fn format_header(&self) -> String {
        format!("🚀 Modbus RTU registers - {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_reading(&self, reading: &RegisterReading) -> String {
        serde_json::to_string_pretty(reading).unwrap_or_default()
    }

    fn format_readings(&self, readings: &[RegisterReading]) -> String {
        serde_json::to_string_pretty(readings).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new() // JSON doesn't need headers
    }
}

pub struct CsvFormatter;

impl DataFormatter for CsvFormatter {
    fn format_reading(&self, reading: &RegisterReading) -> String {
        let timestamp = reading.timestamp.to_rfc3339();
        reading
            .registers()
            .map(|(address, value)| format!("{},{},{},{}", reading.slave_address, address, value, timestamp))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_header(&self) -> String {
        "Slave,Register,Value,Timestamp\n".to_string()
    }
}

pub fn formatter_for(name: &str) -> Option<Box<dyn DataFormatter>> {
    match name {
        "console" => Some(Box::new(ConsoleFormatter)),
        "json" => Some(Box::new(JsonFormatter)),
        "csv" => Some(Box::new(CsvFormatter)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> RegisterReading {
        RegisterReading::new(1, 10, vec![1234, 0xBEEF])
    }

    #[test]
    fn console_lists_each_register() {
        let text = ConsoleFormatter.format_reading(&reading());
        assert!(text.contains("[ 10]  1234  0x04D2"));
        assert!(text.contains("[ 11] 48879  0xBEEF"));
    }

    #[test]
    fn json_keeps_values() {
        let text = JsonFormatter.format_reading(&reading());
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["slave_address"], 1);
        assert_eq!(parsed["values"][0], 1234);
    }

    #[test]
    fn csv_has_one_row_per_register() {
        let text = CsvFormatter.format_reading(&reading());
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].starts_with("1,11,48879,"));
    }

    #[test]
    fn unknown_format_is_none() {
        assert!(formatter_for("json").is_some());
        assert!(formatter_for("xml").is_none());
    }
}
