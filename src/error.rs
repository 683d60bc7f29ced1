use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! finalization_error {
    ($name:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Finalization {
            type_name: $name.to_string(),
            reason: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which covers every failure this library can return.
///
/// Synthesis is all-or-nothing: any error surfacing from
/// [`crate::ProxyGenerator`] means no type was produced, cached or appended to the
/// collector module. Default-value replication problems never surface here, they
/// are tolerated and reported through [`crate::metadata::diagnostics::Diagnostics`].
///
/// # Error Categories
///
/// ## Metadata Errors
/// - [`Error::Malformed`] - Inconsistent metadata or encoded data
/// - [`Error::OutOfBounds`] - Read past the end of a buffer
/// - [`Error::TypeNotFound`], [`Error::MethodNotFound`], [`Error::FieldNotFound`] - Unknown tokens
/// - [`Error::TypeError`] - General type system failure
/// - [`Error::ConstraintViolation`] - Generic argument does not satisfy its parameter
///
/// ## Constant Errors
/// - [`Error::ConstantFormat`] - A stored constant cannot be decoded for its parameter type
/// - [`Error::ConstantMismatch`] - A default value is not accepted by the target parameter
/// - [`Error::TypeConversionInvalid`] - A value cannot be coerced to the requested type
///
/// ## Emission Errors
/// - [`Error::InvalidMnemonic`], [`Error::UnexpectedOperand`], [`Error::WrongOperandType`]
/// - [`Error::UndefinedLabel`], [`Error::DuplicateLabel`], [`Error::InvalidBranch`]
/// - [`Error::StackUnderflow`], [`Error::InvalidOpcode`]
///
/// ## Synthesis Errors
/// - [`Error::Finalization`] - The declared type is not loadable
/// - [`Error::InvalidHandler`] - The interception handler does not derive from `DynamicProxy`
/// - [`Error::NotAnInterface`] - The proxied contract is not an interface
///
/// ## Execution Errors
/// - [`Error::ArgumentMismatch`] - Construction or call arguments do not fit the signature
/// - [`Error::NullReference`], [`Error::InvalidCast`], [`Error::NotImplemented`]
/// - [`Error::RecursionLimit`], [`Error::LockError`]
///
/// # Examples
///
/// ```rust,no_run
/// use cilproxy::{Error, ProxyGenerator, SynthesisConfig, TypeRegistry};
/// use std::sync::Arc;
///
/// let registry = Arc::new(TypeRegistry::new()?);
/// let generator = ProxyGenerator::new(registry.clone(), SynthesisConfig::default());
/// # let interface = registry.get_by_fullname("System.Object").unwrap();
/// # let handler = interface.clone();
/// match generator.create_interception_proxy_type(&interface, &handler) {
///     Ok(proxy) => println!("synthesized {}", proxy.fullname()),
///     Err(Error::InvalidHandler(name)) => eprintln!("{name} is not a DynamicProxy"),
///     Err(Error::Finalization { type_name, reason }) => {
///         eprintln!("{type_name} could not be finalized: {reason}")
///     }
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// # Ok::<(), cilproxy::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Metadata or encoded data is internally inconsistent.
    ///
    /// Includes the source location where the problem was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading encoded data.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Failed to insert a new type into the registry.
    #[error("Failed to insert new type into TypeRegistry - {0}")]
    TypeInsert(Token),

    /// Failed to find a type in the registry.
    #[error("Failed to find type in TypeRegistry - {0}")]
    TypeNotFound(Token),

    /// Failed to find a method in the registry.
    #[error("Failed to find method in TypeRegistry - {0}")]
    MethodNotFound(Token),

    /// Failed to find a field in the registry.
    #[error("Failed to find field in TypeRegistry - {0}")]
    FieldNotFound(Token),

    /// General type system error.
    #[error("{0}")]
    TypeError(String),

    /// A generic argument does not satisfy the constraints of its parameter.
    ///
    /// Raised when instantiating a generic type or a generic method, which is
    /// the type-check boundary for replicated constraints.
    #[error("Type '{argument}' violates the constraints of generic parameter '{parameter}' - {reason}")]
    ConstraintViolation {
        /// Name of the generic parameter
        parameter: String,
        /// Full name of the offending argument
        argument: String,
        /// Which constraint was violated
        reason: String,
    },

    /// A stored constant could not be decoded for the type of its parameter.
    ///
    /// This is the failure mode of date/time and enum typed optional parameters
    /// whose constants do not match the declared type.
    #[error("Constant of element type 0x{element_type:02x} cannot be read as '{target}'")]
    ConstantFormat {
        /// Element type byte of the stored constant
        element_type: u8,
        /// Full name of the declared parameter type
        target: String,
    },

    /// A default value is not accepted by the target parameter type.
    #[error("Default value '{value}' is not valid for parameter type '{target}'")]
    ConstantMismatch {
        /// Rendered default value
        value: String,
        /// Full name of the target parameter type
        target: String,
    },

    /// A value could not be converted to the requested type.
    #[error("Cannot convert '{value}' to '{target}'")]
    TypeConversionInvalid {
        /// Rendered source value
        value: String,
        /// Name of the requested target type
        target: String,
    },

    /// The mnemonic is not known to the encoder.
    #[error("Invalid instruction mnemonic: {0}")]
    InvalidMnemonic(String),

    /// An operand was supplied for an instruction that takes none.
    #[error("Unexpected operand provided for instruction that doesn't take operands")]
    UnexpectedOperand,

    /// The operand does not match the instruction's operand type.
    #[error("Wrong operand type - expected {expected}")]
    WrongOperandType {
        /// The expected operand type
        expected: String,
    },

    /// A branch references a label that was never defined.
    #[error("Undefined label referenced: {0}")]
    UndefinedLabel(String),

    /// A label was defined twice.
    #[error("Label already defined: {0}")]
    DuplicateLabel(String),

    /// A branch offset does not fit its encoding.
    #[error("Invalid branch - {0}")]
    InvalidBranch(String),

    /// An instruction needs more stack entries than are available.
    #[error("Stack underflow at offset 0x{offset:04x}: need {needed}, have {available}")]
    StackUnderflow {
        /// Byte offset of the instruction
        offset: usize,
        /// Entries consumed by the instruction
        needed: usize,
        /// Entries available on the stack
        available: usize,
    },

    /// The byte does not start a supported instruction.
    #[error("Invalid or unsupported opcode 0x{0:02x}")]
    InvalidOpcode(u16),

    /// The declared type cannot be finalized into a loadable type.
    ///
    /// Synthesis failures of this kind are fatal for the synthesis call, there is
    /// no partially usable type.
    #[error("Finalization of '{type_name}' failed - {reason}")]
    Finalization {
        /// Full name of the type that was being declared
        type_name: String,
        /// Why the declaration is not loadable
        reason: String,
    },

    /// The interception handler is not a non-sealed class deriving from `DynamicProxy`.
    #[error("'{0}' is not a valid interception handler")]
    InvalidHandler(String),

    /// The proxied contract is not an interface.
    #[error("'{0}' is not an interface")]
    NotAnInterface(String),

    /// Construction or call arguments do not fit the target signature.
    #[error("Argument mismatch - {0}")]
    ArgumentMismatch(String),

    /// A null reference was dereferenced during execution.
    #[error("Null reference - {0}")]
    NullReference(String),

    /// A cast or unbox failed during execution.
    #[error("Invalid cast from '{from}' to '{to}'")]
    InvalidCast {
        /// Runtime type of the value
        from: String,
        /// Requested type
        to: String,
    },

    /// The method has no implementation that can be executed.
    #[error("No implementation available for '{0}'")]
    NotImplemented(String),

    /// Call depth exceeded the configured limit.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,
}
