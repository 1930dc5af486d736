use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::discretization::mesh::Mesh;
use crate::field::VolField;

/// Write data to CSV file with headers
pub fn write_csv<P: AsRef<Path>>(path: P, headers: &[&str], data: &[Vec<f64>]) -> io::Result<()> {
    if !headers.is_empty() && !data.is_empty() && headers.len() != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Headers count ({}) doesn't match data columns ({})",
                headers.len(),
                data.len()
            ),
        ));
    }

    let mut file = File::create(path)?;

    writeln!(file, "{}", headers.join(","))?;

    let n_rows = data.iter().map(|col| col.len()).max().unwrap_or(0);

    for i in 0..n_rows {
        let row: Vec<String> = data
            .iter()
            .map(|col| {
                if i < col.len() {
                    format!("{:.15e}", col[i])
                } else {
                    String::new()
                }
            })
            .collect();
        writeln!(file, "{}", row.join(","))?;
    }

    Ok(())
}

/// Write cell-centroid profiles of scalar fields along x: one `x` column
/// followed by one column per field.
pub fn write_profiles<P: AsRef<Path>>(
    path: P,
    mesh: &Mesh,
    fields: &[&VolField<f64>],
) -> io::Result<()> {
    let x: Vec<f64> = mesh.cells.iter().map(|c| c.centroid[0]).collect();

    let mut headers = vec!["x"];
    let mut data = vec![x];
    for field in fields {
        headers.push(&field.name);
        data.push(field.internal.clone());
    }
    write_csv(path, &headers, &data)
}

/// Write an outer-iteration history: time, residuals, chemistry feedback.
pub fn write_history<P: AsRef<Path>>(
    path: P,
    history: &[(f64, f64, f64, f64)],
) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "time,initial_residual,chem_dt,mean_active_species")?;
    for (t, res, chem_dt, active) in history {
        writeln!(file, "{t},{res},{chem_dt},{active}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::generator::line_mesh;
    use std::fs;

    #[test]
    fn test_write_csv() {
        let path = "test_output.csv";
        let headers = &["x", "y", "z"];
        let data = vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ];

        write_csv(path, headers, &data).unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("x,y,z"));

        fs::remove_file(path).ok();
    }

    #[test]
    fn profiles_carry_one_row_per_cell() {
        let path = "test_profiles.csv";
        let mesh = line_mesh(1.0, 5);
        let t = VolField::new("T", &mesh, 300.0);

        write_profiles(path, &mesh, &[&t]).unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 6);
        assert!(content.starts_with("x,T"));

        fs::remove_file(path).ok();
    }
}
