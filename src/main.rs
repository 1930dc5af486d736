//! 1-D reacting-diffusion demonstration case: a reversible exothermic
//! A <-> B conversion over a line mesh, with a heated ignition zone,
//! species feed, temperature limiting, and path-flux-analysis mechanism
//! reduction.

use std::fs;
use std::sync::Arc;

use fvreact::chemistry::{
    ArrheniusRate, ChemistryConfig, ChemistryModel, RateLaw, Reaction, ReactionNetwork,
    ReductionConfig, Specie, SpecieCoeff, SubCycleControls,
};
use fvreact::discretization::generator::line_mesh;
use fvreact::discretization::mesh::Mesh;
use fvreact::field::{PatchCondition, VolField};
use fvreact::fvm;
use fvreact::fvm::SolverControls;
use fvreact::models::{FvConstraints, FvModels, ModelRegistry};
use fvreact::processing::csv_writer;
use fvreact::processing::summary::CaseSummary;

// gas-phase transport properties, normalized
const DIFFUSIVITY: f64 = 2e-5;
const THERMAL_DIFFUSIVITY: f64 = 3e-5;
const RHO_CP: f64 = 1.2e3;

fn main() {
    if let Err(e) = run() {
        eprintln!("Fatal: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all("output/main")?;

    let mut mesh = line_mesh(0.1, 60);
    mesh.add_zone("igniter", |c| c[0] > 0.04 && c[0] < 0.05);
    mesh.add_zone("outlet", |c| c[0] > 0.095);

    let network = Arc::new(build_network()?);
    let mut chemistry = build_chemistry(&network, &mesh)?;
    let (mut models, mut constraints) = build_models(&mesh)?;

    let mut temperature = VolField::new("T", &mesh, 300.0)
        .with_condition(&mesh, "left", PatchCondition::FixedValue(300.0));
    temperature.correct_boundary(&mesh);

    let dt = 1e-3;
    let n_steps = 200;
    let controls = SolverControls::default();

    println!("Reacting diffusion on {} cells, dt = {dt:.1e}", mesh.n_cells());
    println!("  Step |    Time   |  chem dt  | active | T max");

    let mut history = Vec::new();
    let mut time = 0.0;

    for step in 1..=n_steps {
        time += dt;

        // chemistry first: integrated source fields for this step
        let chem_dt = chemistry.solve(&mesh, dt)?;

        models.begin_pass();
        constraints.begin_pass();

        // species transport with the chemistry mass sources
        let mut step_residual: f64 = 0.0;
        for i in 0..network.n_species() {
            let molar_mass = network.species()[i].molar_mass;
            let molar_source: Vec<f64> = chemistry.rr(i).iter().map(|r| r / molar_mass).collect();

            let field = &chemistry.concentrations[i];
            let name = field.name.clone();
            let mut eqn = fvm::ddt(field, dt, &mesh)
                + fvm::diffusion(DIFFUSIVITY, field, &mesh)
                + fvm::su(&molar_source, &name, &mesh);
            models.add_sup(&mut eqn, &mesh, time)?;
            eqn.inject_boundary_conditions(&mesh);
            constraints.constrain(&mut eqn, &mesh, time)?;

            let field = &mut chemistry.concentrations[i];
            let perf = eqn.solve(&mesh, field, controls)?;
            step_residual = step_residual.max(perf.initial_residual);
            constraints.constrain_field(field, &mesh)?;
        }

        // temperature with the heat-release source
        let heat_source: Vec<f64> = chemistry.qdot().iter().map(|q| q / RHO_CP).collect();
        let mut t_eqn = fvm::ddt(&temperature, dt, &mesh)
            + fvm::diffusion(THERMAL_DIFFUSIVITY, &temperature, &mesh)
            + fvm::su(&heat_source, "T", &mesh);
        models.add_sup(&mut t_eqn, &mesh, time)?;
        t_eqn.inject_boundary_conditions(&mesh);
        constraints.constrain(&mut t_eqn, &mesh, time)?;
        let perf = t_eqn.solve(&mesh, &mut temperature, controls)?;
        step_residual = step_residual.max(perf.initial_residual);
        constraints.constrain_field(&mut temperature, &mesh)?;

        // every configured entry must have entered its equation
        models.finish_pass()?;
        constraints.finish_pass()?;

        chemistry.temperature.internal.copy_from_slice(&temperature.internal);
        chemistry.temperature.correct_boundary(&mesh);

        let mean_active = chemistry.reduction_stats().mean_active_species();
        history.push((time, step_residual, chem_dt, mean_active));

        if step % 20 == 0 {
            let t_max = temperature
                .internal
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);
            println!(
                "{step:>6} | {time:>9.4} | {chem_dt:>9.3e} | {mean_active:>6.2} | {t_max:>7.1}"
            );
        }
    }

    csv_writer::write_profiles(
        "output/main/profiles.csv",
        &mesh,
        &[
            &chemistry.concentrations[0],
            &chemistry.concentrations[1],
            &temperature,
        ],
    )?;
    csv_writer::write_history("output/main/history.csv", &history)?;

    let mut summary = CaseSummary::from_case(&mesh, &chemistry);
    summary.add_chemistry_info(&chemistry);
    summary.add_solver_info(n_steps, history.last().map_or(0.0, |h| h.1));
    summary.write_to_file("output/main/case_summary.txt")?;
    summary.print_to_console();

    println!("Profiles saved to output/main/profiles.csv");
    Ok(())
}

fn build_network() -> Result<ReactionNetwork, Box<dyn std::error::Error>> {
    let species = vec![
        Specie {
            name: "A".to_string(),
            molar_mass: 30.0,
            h_formation: 0.0,
        },
        Specie {
            name: "B".to_string(),
            molar_mass: 30.0,
            h_formation: -2.5e6,
        },
    ];
    let reactions = vec![Reaction {
        lhs: vec![SpecieCoeff {
            index: 0,
            stoich: 1.0,
            exponent: 1.0,
        }],
        rhs: vec![SpecieCoeff {
            index: 1,
            stoich: 1.0,
            exponent: 1.0,
        }],
        forward: RateLaw::Arrhenius(ArrheniusRate::new(5e4, 0.0, 6000.0)),
        reverse: Some(RateLaw::Arrhenius(ArrheniusRate::new(1e2, 0.0, 4000.0))),
    }];
    Ok(ReactionNetwork::new(species, reactions)?)
}

fn build_chemistry(
    network: &Arc<ReactionNetwork>,
    mesh: &Mesh,
) -> Result<ChemistryModel, Box<dyn std::error::Error>> {
    let config = ChemistryConfig {
        initial_chemical_dt: 1e-7,
        max_chemical_dt: 1e-2,
        reduction: ReductionConfig {
            method: "pathFluxAnalysis".to_string(),
            tolerance: 1e-3,
            initial_set: vec!["A".to_string()],
        },
        ode: SubCycleControls::default(),
    };

    let mut c_a = VolField::new("A", mesh, 1.0)
        .with_condition(mesh, "left", PatchCondition::FixedValue(1.0));
    c_a.correct_boundary(mesh);
    let c_b = VolField::new("B", mesh, 0.0);

    let temperature = VolField::new("T", mesh, 300.0);
    let pressure = VolField::new("p", mesh, 1e5);

    Ok(ChemistryModel::new(
        &config,
        Arc::clone(network),
        mesh,
        vec![c_a, c_b],
        temperature,
        pressure,
    )?)
}

fn build_models(
    mesh: &Mesh,
) -> Result<(FvModels, FvConstraints), Box<dyn std::error::Error>> {
    let registry = ModelRegistry::with_builtins();
    let config = serde_json::json!({
        "igniterHeat": {
            "type": "semiImplicitSource",
            "field": "T",
            "selectionMode": "cellZone",
            "cellZone": "igniter",
            "su": { "type": "table", "values": [[0.0, 2.0e4], [0.05, 2.0e4], [0.06, 0.0]] }
        },
        "feedA": {
            "type": "massSource",
            "fields": ["A"],
            "selectionMode": "cellZone",
            "cellZone": "igniter",
            "rate": { "type": "constant", "value": 1.0e-4 }
        },
        "pinOutletB": {
            "type": "fixedValueConstraint",
            "selectionMode": "cellZone",
            "cellZone": "outlet",
            "fieldValues": { "B": { "type": "constant", "value": 0.0 } }
        },
        "limitT": {
            "type": "limitBounds",
            "field": "T",
            "selectionMode": "all",
            "min": 250.0,
            "max": 2500.0
        }
    });
    Ok(registry.build(&config, mesh)?)
}
