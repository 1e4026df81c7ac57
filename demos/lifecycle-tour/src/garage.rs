use beanstack::config::OS_NAME;
use beanstack::prelude::*;

pub trait Engine: Send + Sync {
    fn start(&self) -> String;
}

pub struct Petrol {
    cylinders: u32,
}

impl Engine for Petrol {
    fn start(&self) -> String {
        format!("{}-cylinder engine running", self.cylinders)
    }
}

pub struct Car {
    pub model: String,
    pub engine: Arc<dyn Engine>,
    ready: bool,
}

impl Initialize for Car {
    fn initialize(&mut self) -> std::result::Result<(), LifecycleError> {
        tracing::info!("car afterPropertiesSet: {}", self.model);
        if self.engine.start().is_empty() {
            return Err(LifecycleError::init_failed(format!("{} has a silent engine", self.model)));
        }
        self.ready = true;
        Ok(())
    }
}

impl Dispose for Car {
    fn dispose(&self) -> std::result::Result<(), LifecycleError> {
        tracing::info!("car dispose: {}", self.model);
        if !self.ready {
            return Err(LifecycleError::shutdown_failed(format!("{} was never started", self.model)));
        }
        Ok(())
    }
}

/// Reports the shell of the platform it was registered for.
pub trait Shell: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Bash;
struct PowerShell;

impl Shell for Bash {
    fn name(&self) -> &'static str {
        "bash"
    }
}

impl Shell for PowerShell {
    fn name(&self) -> &'static str {
        "powershell"
    }
}

#[derive(Default)]
pub struct EngineModule;

impl Module for EngineModule {
    fn register(&self, registrar: &mut Registrar<'_>) -> beanstack::Result<()> {
        let cylinders = registrar
            .environment()
            .get_as::<u32>("engine.cylinders")
            .unwrap_or(4);
        if cylinders == 0 {
            return Err(ContainerError::ModuleRegistrationFailed {
                message: "engine.cylinders must be at least 1".to_string(),
            });
        }
        registrar.register(
            Definition::builder::<Petrol>("engine")
                .constructor(move |_| Ok(Petrol { cylinders }))
                .expose::<dyn Engine, _>(|e| e as Arc<dyn Engine>)
                .build()?,
        )?;
        Ok(())
    }
}

#[derive(Default)]
pub struct GarageModule;

impl Module for GarageModule {
    fn imports(&self) -> Vec<Box<dyn Module>> {
        vec![Box::new(EngineModule)]
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> beanstack::Result<()> {
        registrar.register(
            Definition::builder::<Car>("car")
                .depends_on(Dependency::of_type::<dyn Engine>())
                .constructor(|args| {
                    tracing::info!("car constructor...");
                    Ok(Car {
                        model: "Han DM-P".to_string(),
                        engine: args.get::<dyn Engine>(0)?,
                        ready: false,
                    })
                })
                .initializing()
                .disposable()
                .destroy_hook("park", |car| {
                    tracing::info!("parking {}", car.model);
                    Ok(())
                })
                .build()?,
        )?;

        registrar.register(
            Definition::builder::<Bash>("bash")
                .constructor(|_| Ok(Bash))
                .expose::<dyn Shell, _>(|s| s as Arc<dyn Shell>)
                .condition(Condition::property_contains(OS_NAME, "linux"))
                .build()?,
        )?;
        registrar.register(
            Definition::builder::<PowerShell>("powershell")
                .constructor(|_| Ok(PowerShell))
                .expose::<dyn Shell, _>(|s| s as Arc<dyn Shell>)
                .condition(Condition::property_contains(OS_NAME, "windows"))
                .build()?,
        )?;
        Ok(())
    }
}
