use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::chemistry::ChemistryModel;
use crate::discretization::mesh::{distance, Mesh};

/// End-of-run report: mesh statistics, mechanism size, reduction and
/// solver diagnostics.
pub struct CaseSummary {
    // Mesh info
    pub num_cells: usize,
    pub num_faces: usize,
    pub num_patches: usize,
    pub min_cell_spacing: f64,
    pub max_cell_spacing: f64,
    pub avg_cell_volume: f64,

    // Mechanism info
    pub num_species: usize,
    pub num_reactions: usize,

    // Chemistry diagnostics
    pub mean_active_species: Option<f64>,
    pub min_chemical_dt: Option<f64>,
    pub reduce_cpu_seconds: Option<f64>,
    pub integrate_cpu_seconds: Option<f64>,

    // Outer-loop info
    pub outer_iterations: Option<usize>,
    pub final_residual: Option<f64>,
}

impl CaseSummary {
    pub fn from_case(mesh: &Mesh, chemistry: &ChemistryModel) -> Self {
        let mut spacings = Vec::new();
        for (_, _, owner, neigh) in mesh.internal_faces() {
            spacings.push(distance(
                mesh.cells[owner].centroid,
                mesh.cells[neigh].centroid,
            ));
        }
        let min_spacing = spacings.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_spacing = spacings.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let avg_volume =
            mesh.cells.iter().map(|c| c.volume).sum::<f64>() / mesh.n_cells() as f64;

        Self {
            num_cells: mesh.n_cells(),
            num_faces: mesh.faces.len(),
            num_patches: mesh.patches.len(),
            min_cell_spacing: min_spacing,
            max_cell_spacing: max_spacing,
            avg_cell_volume: avg_volume,
            num_species: chemistry.network().n_species(),
            num_reactions: chemistry.network().n_reactions(),
            mean_active_species: None,
            min_chemical_dt: None,
            reduce_cpu_seconds: None,
            integrate_cpu_seconds: None,
            outer_iterations: None,
            final_residual: None,
        }
    }

    pub fn add_chemistry_info(&mut self, chemistry: &ChemistryModel) {
        let stats = chemistry.reduction_stats();
        self.mean_active_species = Some(stats.mean_active_species());
        self.reduce_cpu_seconds = Some(stats.reduce_time.as_secs_f64());
        self.integrate_cpu_seconds = Some(stats.integrate_time.as_secs_f64());
        self.min_chemical_dt = chemistry
            .delta_t_chem()
            .iter()
            .cloned()
            .reduce(f64::min);
    }

    pub fn add_solver_info(&mut self, iterations: usize, final_residual: f64) {
        self.outer_iterations = Some(iterations);
        self.final_residual = Some(final_residual);
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        write!(file, "{}", self.format())
    }

    pub fn print_to_console(&self) {
        print!("{}", self.format());
    }

    fn format(&self) -> String {
        let mut s = String::new();
        s.push_str(&"=".repeat(60));
        s.push_str("\n");
        s.push_str(&format!("{:^60}\n", "CASE SUMMARY"));
        s.push_str(&"=".repeat(60));
        s.push_str("\n");
        s.push_str(&format!(
            "Mesh:        {} cells, {} faces, {} patches\n",
            self.num_cells, self.num_faces, self.num_patches
        ));
        s.push_str(&format!(
            "Spacing:     min = {:.3e}, max = {:.3e}, avg volume = {:.3e}\n",
            self.min_cell_spacing, self.max_cell_spacing, self.avg_cell_volume
        ));
        s.push_str(&format!(
            "Mechanism:   {} species, {} reactions\n",
            self.num_species, self.num_reactions
        ));
        if let Some(mean) = self.mean_active_species {
            s.push_str(&format!("Reduction:   mean active species = {mean:.2}\n"));
        }
        if let (Some(reduce), Some(integrate)) =
            (self.reduce_cpu_seconds, self.integrate_cpu_seconds)
        {
            s.push_str(&format!(
                "Chemistry:   reduce = {reduce:.3}s, integrate = {integrate:.3}s\n"
            ));
        }
        if let Some(dt) = self.min_chemical_dt {
            s.push_str(&format!("Chem dt:     min = {dt:.3e}\n"));
        }
        if let Some(iters) = self.outer_iterations {
            s.push_str(&format!("Outer loop:  {iters} iterations\n"));
        }
        if let Some(res) = self.final_residual {
            s.push_str(&format!("Residual:    final = {res:.3e}\n"));
        }
        s.push_str(&"=".repeat(60));
        s.push_str("\n");
        s
    }
}
