use std::fs;
use std::path::Path;

/// SplitMix64: enough randomness for plausible, reproducible sessions.
struct SessionRng(u64);

impl SessionRng {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1).
    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Normal sample via the Marsaglia polar method.
    fn normal(&mut self, mean: f64, sd: f64) -> f64 {
        loop {
            let x = 2.0 * self.unit() - 1.0;
            let y = 2.0 * self.unit() - 1.0;
            let r2 = x * x + y * y;
            if r2 > 0.0 && r2 < 1.0 {
                return mean + sd * x * (-2.0 * r2.ln() / r2).sqrt();
            }
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// One summary export: header line, column labels, then the
/// `var_name` / `var` / `var_desc` rows.
fn write_summary(path: &Path, animal: i64, experiment: &str, day: i64, vars: &[(&str, String, &str)]) {
    let mut names = vec!["var_name".to_string(), "animal_ID".into(), "experiment".into(), "day".into()];
    let mut values = vec!["var".to_string(), animal.to_string(), experiment.into(), day.to_string()];
    let mut descs = vec!["var_desc".to_string(), "Animal ID".into(), "Experiment".into(), "Day".into()];
    for (name, value, desc) in vars {
        names.push(name.to_string());
        values.push(value.clone());
        descs.push(desc.to_string());
    }
    let labels: Vec<String> = std::iter::once(String::new())
        .chain((0..names.len() - 1).map(|i| i.to_string()))
        .collect();

    let mut out = format!("animal:{animal},experiment:{experiment},day:{day}\n").into_bytes();
    {
        let mut wtr = csv::Writer::from_writer(&mut out);
        for row in [&labels, &names, &values, &descs] {
            wtr.write_record(row).expect("Failed to write summary row");
        }
        wtr.flush().expect("Failed to flush summary");
    }
    fs::write(path, out).expect("Failed to write summary file");
}

/// One by-round export: header line, then `Round` plus one column per variable.
fn write_rounds(path: &Path, animal: i64, experiment: &str, day: i64, latencies: &[f64], correct: &[bool]) {
    let mut out = format!("animal:{animal},experiment:{experiment},day:{day}\n").into_bytes();
    {
        let mut wtr = csv::Writer::from_writer(&mut out);
        wtr.write_record(["", "Round", "latency", "correct"])
            .expect("Failed to write round header");
        for (i, (lat, ok)) in latencies.iter().zip(correct).enumerate() {
            wtr.write_record([
                i.to_string(),
                (i + 1).to_string(),
                round2(*lat).to_string(),
                u8::from(*ok).to_string(),
            ])
            .expect("Failed to write round row");
        }
        wtr.flush().expect("Failed to flush rounds");
    }
    fs::write(path, out).expect("Failed to write round file");
}

fn main() {
    let mut rng = SessionRng(42);

    let output_dir = Path::new("sample_sessions");
    let summary_dir = output_dir.join("summary");
    let round_dir = output_dir.join("by_round");
    fs::create_dir_all(&summary_dir).expect("Failed to create summary directory");
    fs::create_dir_all(&round_dir).expect("Failed to create by-round directory");

    let animals = [1i64, 2, 3, 4];
    let experiment = "FR1";
    let days = 1..=5i64;

    let mut n_files = 0;
    for &animal in &animals {
        let base_weight = rng.normal(42.0, 3.0);
        for day in days.clone() {
            // Animal 4 skips day 3, leaving a gap in the matrices.
            if animal == 4 && day == 3 {
                continue;
            }

            let n_rounds = 8 + (rng.next_u64() % 5) as usize;
            let skill = 0.4 + 0.1 * day as f64;
            let latencies: Vec<f64> = (0..n_rounds)
                .map(|_| rng.normal(3.0 / day as f64 + 0.5, 0.3).max(0.1))
                .collect();
            let correct: Vec<bool> = (0..n_rounds).map(|_| rng.unit() < skill).collect();
            let accuracy = correct.iter().filter(|&&c| c).count() as f64 / n_rounds as f64;
            let mean_latency = latencies.iter().sum::<f64>() / n_rounds as f64;

            let vars = [
                ("weight", round2(base_weight + rng.normal(0.0, 0.5)).to_string(), "Body weight (g)"),
                ("rounds", n_rounds.to_string(), "Rounds completed"),
                ("accuracy", round2(accuracy).to_string(), "Fraction of correct rounds"),
                ("mean_latency", round2(mean_latency).to_string(), "Mean response latency (s)"),
                ("date", format!("2024-03-{:02}", day + 10), "Session date"),
            ];

            write_summary(
                &summary_dir.join(format!("vole{animal}_day{day}_summary.csv")),
                animal,
                experiment,
                day,
                &vars,
            );
            write_rounds(
                &round_dir.join(format!("vole{animal}_day{day}_rounds.csv")),
                animal,
                experiment,
                day,
                &latencies,
                &correct,
            );
            n_files += 2;
        }
    }

    println!("Wrote {n_files} session files to {}", output_dir.display());
}
