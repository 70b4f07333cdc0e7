use std::io::{self, Write};

use crate::sim::Sample;

/// Write a closed-loop response to CSV format.
///
/// Columns: time, demand_cd, pitch_deg, rate_dps, command_cd, elevator_deg,
///          target, actual, p, i, d, ff, dff, d_mod, slew_rate, pd_limit
pub fn write_response<W: Write>(writer: &mut W, samples: &[Sample]) -> io::Result<()> {
    writeln!(
        writer,
        "time,demand_cd,pitch_deg,rate_dps,command_cd,elevator_deg,\
         target,actual,p,i,d,ff,dff,d_mod,slew_rate,pd_limit"
    )?;

    for s in samples {
        let c = &s.info;
        writeln!(
            writer,
            "{:.4},{:.1},{:.4},{:.4},{:.2},{:.4},\
             {:.4},{:.4},{:.5},{:.5},{:.5},{:.5},{:.5},{:.4},{:.4},{}",
            s.time,
            s.demand_cd,
            s.pitch_deg,
            s.rate_dps,
            s.command_cd,
            s.elevator_deg,
            c.target, c.actual,
            c.p, c.i, c.d, c.ff, c.dff,
            c.d_mod,
            c.slew_rate,
            u8::from(c.pd_limit),
        )?;
    }

    Ok(())
}

/// Write a response to a CSV file at the given path.
pub fn write_response_file(path: &str, samples: &[Sample]) -> io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    write_response(&mut file, samples)
}
