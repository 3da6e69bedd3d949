//! # Seed Data Generator
//!
//! Populates the database with a small workshop for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./torque_dev.db with 20 customers (default)
//! cargo run -p torque-db --bin seed
//!
//! # Custom customer count
//! cargo run -p torque-db --bin seed -- --customers 100
//!
//! # Specify database path
//! cargo run -p torque-db --bin seed -- --db ./data/torque.db
//! ```
//!
//! ## Generated Data
//! - One outlet with an admin, a cashier and two technicians
//!   (password `torque-dev` for everyone)
//! - Parts catalog with SKUs `PRT-{INDEX}` and a labour catalog
//! - Customers with one motorbike each and a service job for every third
//! - Showroom vehicles, the first one reconditioned and listed for sale

use std::env;

use torque_core::{
    CompleteReconditioning, DetailKind, ItemKind, NewCustomer, NewCustomerVehicle, NewOutlet,
    NewProduct, NewReconditioningDetail, NewReconditioningJob, NewService, NewServiceDetail,
    NewServiceJob, NewUser, NewVehicle, OutletStatus, Page, ProductUsage, ServiceJobStatus,
    StatusChange, UserRole, VehicleCondition, VehicleOwnership,
};
use torque_db::{Database, DbConfig};

/// Parts: (name, cost cents, price cents, opening stock)
const PARTS: &[(&str, i64, i64, i64)] = &[
    ("Engine Oil 1L", 45_00, 65_00, 40),
    ("Oil Filter", 20_00, 35_00, 25),
    ("Spark Plug", 18_00, 30_00, 50),
    ("Brake Pad Front", 60_00, 95_00, 12),
    ("Brake Pad Rear", 55_00, 85_00, 12),
    ("Drive Belt", 120_00, 180_00, 6),
    ("Air Filter", 35_00, 55_00, 15),
    ("Tyre 80/90-14", 210_00, 290_00, 8),
    ("Chain Kit", 240_00, 330_00, 4),
    ("Coolant 1L", 30_00, 45_00, 20),
];

/// Labour: (name, price cents)
const SERVICES: &[(&str, i64)] = &[
    ("Regular Service", 75_00),
    ("Oil Change", 25_00),
    ("Brake Service", 50_00),
    ("CVT Cleaning", 60_00),
    ("Carburettor Tuning", 45_00),
    ("Full Repaint", 1_200_00),
];

const FIRST_NAMES: &[&str] = &["Adi", "Budi", "Citra", "Dewi", "Eko", "Fajar", "Gita", "Hadi"];
const LAST_NAMES: &[&str] = &["Santoso", "Wijaya", "Pratama", "Lestari", "Nugroho"];
const BIKES: &[(&str, &str)] = &[
    ("Honda", "Beat"),
    ("Honda", "Vario 125"),
    ("Yamaha", "NMAX"),
    ("Yamaha", "Mio"),
    ("Suzuki", "Nex II"),
];

const DEV_PASSWORD: &str = "torque-dev";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut customers: usize = 20;
    let mut db_path = String::from("./torque_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--customers" | "-c" => {
                if i + 1 < args.len() {
                    customers = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Torque POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --customers <N>  Number of customers to generate (default: 20)");
                println!("  -d, --db <PATH>      Database file path (default: ./torque_dev.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Torque POS Seed Data Generator");
    println!("=================================");
    println!("Database:  {}", db_path);
    println!("Customers: {}", customers);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.outlets().list(None, Page::new(Some(1), None)).await?;
    if !existing.is_empty() {
        println!("⚠ Database already has outlets");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();

    // ----- Registry -----

    let outlet = db
        .outlets()
        .create(NewOutlet {
            name: "Torque Main Workshop".to_string(),
            branch_type: Some("workshop".to_string()),
            city: Some("Jakarta".to_string()),
            status: Some(OutletStatus::Active),
            utc_offset_minutes: Some(420),
            ..Default::default()
        })
        .await?;

    let staff = [
        ("Admin", "admin@torque.dev", UserRole::Admin),
        ("Cashier", "cashier@torque.dev", UserRole::Cashier),
        ("Tech One", "tech1@torque.dev", UserRole::Technician),
        ("Tech Two", "tech2@torque.dev", UserRole::Technician),
    ];
    let mut users = Vec::with_capacity(staff.len());
    for (name, email, role) in staff {
        users.push(
            db.users()
                .create(NewUser {
                    name: name.to_string(),
                    email: email.to_string(),
                    password: DEV_PASSWORD.to_string(),
                    role: Some(role),
                    outlet_id: Some(outlet.id),
                    created_by: None,
                })
                .await?,
        );
    }
    let admin = &users[0];
    let technicians = [&users[2], &users[3]];
    println!("✓ Outlet '{}' with {} staff", outlet.name, users.len());

    // ----- Inventory -----

    let mut products = Vec::with_capacity(PARTS.len());
    for (idx, (name, cost, price, stock)) in PARTS.iter().enumerate() {
        products.push(
            db.products()
                .create(NewProduct {
                    name: name.to_string(),
                    sku: Some(format!("PRT-{:03}", idx + 1)),
                    barcode: Some(format!("899{:010}", idx + 1)),
                    cost_price_cents: *cost,
                    selling_price_cents: *price,
                    stock: Some(*stock),
                    usage: Some(ProductUsage::Sale),
                    created_by: Some(admin.id),
                    ..Default::default()
                })
                .await?,
        );
    }

    let mut services = Vec::with_capacity(SERVICES.len());
    for (name, price) in SERVICES {
        services.push(
            db.services()
                .create(NewService {
                    name: name.to_string(),
                    price_cents: *price,
                    created_by: Some(admin.id),
                    ..Default::default()
                })
                .await?,
        );
    }
    println!("✓ {} parts, {} services", products.len(), services.len());

    // ----- Customers & service jobs -----

    let mut jobs = 0;
    for n in 0..customers {
        let name = format!(
            "{} {}",
            FIRST_NAMES[n % FIRST_NAMES.len()],
            LAST_NAMES[(n / FIRST_NAMES.len()) % LAST_NAMES.len()]
        );
        let customer = db
            .customers()
            .create(NewCustomer {
                name,
                phone: format!("0812{:07}", n + 1),
                created_by: Some(admin.id),
                ..Default::default()
            })
            .await?;

        let (brand, model) = BIKES[n % BIKES.len()];
        let vehicle = db
            .customer_vehicles()
            .create(NewCustomerVehicle {
                customer_id: customer.id,
                plate_number: format!("B {} DEV", 1000 + n),
                chassis_number: format!("MH1DEV{:08}", n + 1),
                engine_number: format!("JFDEV{:08}", n + 1),
                brand: brand.to_string(),
                model: model.to_string(),
                year: Some(2018 + (n % 6) as i32),
                created_by: Some(admin.id),
                ..Default::default()
            })
            .await?;

        if n % 3 != 0 {
            continue;
        }

        let technician = technicians[jobs % technicians.len()];
        let job = db
            .service_jobs()
            .create(NewServiceJob {
                outlet_id: outlet.id,
                customer_id: customer.id,
                vehicle_id: vehicle.id,
                received_by: admin.id,
                problem_description: "Regular service, engine noise when idle".to_string(),
                technician_id: Some(technician.id),
                ..Default::default()
            })
            .await?;

        let service = &services[0];
        db.service_details()
            .create(
                job.id,
                NewServiceDetail {
                    item_kind: ItemKind::Service,
                    item_id: service.id,
                    description: None,
                    serial_number: None,
                    quantity: 1,
                    unit_price_cents: service.price_cents,
                    unit_cost_cents: 0,
                    created_by: Some(admin.id),
                },
            )
            .await?;
        let oil = &products[0];
        db.service_details()
            .create(
                job.id,
                NewServiceDetail {
                    item_kind: ItemKind::Product,
                    item_id: oil.id,
                    description: None,
                    serial_number: None,
                    quantity: 1,
                    unit_price_cents: oil.selling_price_cents,
                    unit_cost_cents: oil.cost_price_cents,
                    created_by: Some(admin.id),
                },
            )
            .await?;

        // Every other job is already on the bench.
        if jobs % 2 == 0 {
            db.service_jobs()
                .transition(
                    job.id,
                    StatusChange {
                        status: ServiceJobStatus::Working,
                        user_id: technician.id,
                        notes: None,
                    },
                )
                .await?;
        }
        jobs += 1;
    }
    println!("✓ {} customers, {} service jobs", customers, jobs);

    // ----- Showroom -----

    let mut showroom = Vec::new();
    for (idx, (brand, model)) in BIKES.iter().enumerate() {
        showroom.push(
            db.vehicles()
                .create(NewVehicle {
                    customer_id: None,
                    plate_number: format!("B {} SHW", 9000 + idx),
                    chassis_number: format!("MH1SHW{:08}", idx + 1),
                    engine_number: format!("JFSHW{:08}", idx + 1),
                    brand: brand.to_string(),
                    model: model.to_string(),
                    vehicle_type: Some("scooter".to_string()),
                    year: Some(2019),
                    color: None,
                    ownership: Some(VehicleOwnership::Showroom),
                    condition: VehicleCondition::Fair,
                    sale_status: None,
                    purchase_price_cents: 8_000_00 + idx as i64 * 500_00,
                    selling_price_cents: 0,
                    created_by: Some(admin.id),
                })
                .await?,
        );
    }

    let job = db
        .reconditioning()
        .create(NewReconditioningJob {
            vehicle_id: showroom[0].id,
            title: "Refurbish before resale".to_string(),
            technician_id: Some(technicians[0].id),
            created_by: Some(admin.id),
            ..Default::default()
        })
        .await?;
    db.reconditioning()
        .add_detail(
            job.id,
            NewReconditioningDetail {
                kind: DetailKind::Part,
                product_id: Some(products[5].id),
                service_id: None,
                description: None,
                quantity: 1,
                unit_price_cents: None,
                usage_at: None,
                created_by: Some(admin.id),
            },
        )
        .await?;
    db.reconditioning()
        .add_detail(
            job.id,
            NewReconditioningDetail {
                kind: DetailKind::Service,
                product_id: None,
                service_id: Some(services[3].id),
                description: None,
                quantity: 1,
                unit_price_cents: None,
                usage_at: None,
                created_by: Some(admin.id),
            },
        )
        .await?;
    db.reconditioning()
        .complete(job.id, CompleteReconditioning::default())
        .await?;
    println!("✓ {} showroom vehicles, 1 reconditioned and for sale", showroom.len());

    println!();
    println!("✓ Seed complete in {:?}", start.elapsed());
    println!("  Log in with any staff email and password '{}'", DEV_PASSWORD);

    Ok(())
}
