use cemx::{
    line, optimize, point, solve, Attribute, Bounds, Deviations, OptimizationBounds,
    OptimizationSettings, PointLoads, SolverSettings, Supports, TargetGeometry, Targets,
    TopologyBuilder, Trails,
};
use petgraph::graph::{EdgeIndex, NodeIndex};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Two trails run from the crown down to the springings.
    let trails = Trails::broadcast(
        vec![
            line(point(-1.0, 0.0, 4.0), point(-3.0, 0.0, 3.0)),
            line(point(-3.0, 0.0, 3.0), point(-5.0, 0.0, 0.0)),
            line(point(1.0, 0.0, 4.0), point(3.0, 0.0, 3.0)),
            line(point(3.0, 0.0, 3.0), point(5.0, 0.0, 0.0)),
        ],
        &[Attribute::from(-2.5)],
    );
    // Compressed struts between the crown nodes and between the haunches.
    let deviations = Deviations::new(
        vec![
            line(point(-1.0, 0.0, 4.0), point(1.0, 0.0, 4.0)),
            line(point(-3.0, 0.0, 3.0), point(3.0, 0.0, 3.0)),
        ],
        vec![Attribute::from(-2.0), Attribute::from("haunch")],
    );
    let loads = PointLoads::broadcast(
        vec![
            point(-1.0, 0.0, 4.0),
            point(1.0, 0.0, 4.0),
            point(-3.0, 0.0, 3.0),
            point(3.0, 0.0, 3.0),
        ],
        &[],
        &[],
        &[-1.0],
    );
    let supports = Supports::new(vec![point(-5.0, 0.0, 0.0), point(5.0, 0.0, 0.0)]);

    let topology = TopologyBuilder::new(trails)
        .deviations(deviations)
        .loads(loads)
        .supports(supports)
        .build()
        .with_parameters(&["haunch".to_string()], &[-0.5]);
    println!("{topology}\n");

    let model = solve(&topology, None, &SolverSettings::default())?;
    println!("{model}\n");

    // Pull both springings back onto the ground line by adjusting the trails.
    let targets = Targets::new().with_nodes(
        vec![
            TargetGeometry::Point(point(-5.0, 0.0, 0.0)),
            TargetGeometry::Point(point(5.0, 0.0, 0.0)),
        ],
        &[NodeIndex::new(2), NodeIndex::new(5)],
        &[1.0],
    );
    let bounds = OptimizationBounds {
        trails: Bounds::new((0..4).map(EdgeIndex::new).collect(), &[1.5], &[1.5]),
        ..OptimizationBounds::default()
    };
    let settings = OptimizationSettings {
        max_iterations: 200,
        ..OptimizationSettings::default()
    };
    let optimised = optimize(
        &topology,
        &targets,
        &bounds,
        None,
        &SolverSettings::default(),
        &settings,
    )?;
    println!("{optimised}\n");

    if let Some(form) = optimised.form() {
        for member in form.trails() {
            println!(
                "trail {:<10} {:>8.3} {:?}",
                member.label, member.force, member.sense
            );
        }
        for node in form.nodes() {
            println!(
                "node {:<8} ({:.3}, {:.3}, {:.3})",
                node.label, node.position.x, node.position.y, node.position.z
            );
        }
    }

    Ok(())
}
