use smartmouse_kinematics::*;

fn main() {
    let config = RobotConfig::SIM;
    let drive = match DifferentialDrive::from_config(&config) {
        Ok(drive) => drive,
        Err(e) => {
            eprintln!("Failed to initialize kinematics: {}", e);
            return;
        }
    };

    let facing = Direction::E;
    let start = GlobalPose::new(0.5, 0.5, facing.yaw());
    let goal_disp = start.disp_to_nth_edge(facing, 2);
    let limits = ProfileLimits::new(config.to_cell_units(config.max_speed), config.jerk_cupsss);
    let profile = match VelocityProfile::new(start, goal_disp, 0.0, 0.0, limits) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("Failed to plan profile: {}", e);
            return;
        }
    };

    let dt = 0.05; // Time step in seconds
    println!("Driving {} cu {} from {}", goal_disp, facing, start);
    println!("  {}", drive);
    println!("  Peak speed:  {:.3} cu/s", profile.peak_speed());
    println!("  Cruise time: {:.3} s", profile.cruise_time());
    println!("  Duration:    {:.3} s", profile.duration());
    println!("\nSimulating...");

    let mut pose = start;
    let mut t = 0.0;
    while t < profile.duration() + dt {
        let v = profile.compute_forward_velocity(t);
        match drive.update_pose(pose, v, v, dt) {
            Ok(new_pose) => pose = new_pose,
            Err(e) => {
                eprintln!("Error at t = {:.2} s: {}", t, e);
                break;
            }
        }
        t += dt;
        println!("t = {:>5.2} s  v = {:.3} cu/s  {}", t, v, pose);
    }

    println!("\nSimulation complete.");
    println!("Final pose: {}  (local: {:?})", pose, LocalPose::from_global(pose, facing));
}
